use actix_files as fs;
use actix_web::web;

use crate::config::Config;
use crate::web::handlers;

pub fn configure(cfg: &mut web::ServiceConfig, config: &Config) {
    cfg.service(
        web::scope("/api")
            .app_data(
                web::JsonConfig::default()
                    .limit(config.max_body_bytes)
                    .error_handler(handlers::json_error_handler),
            )
            .service(
                web::resource("/chat")
                    .route(web::post().to(handlers::chat))
                    .default_service(web::to(handlers::method_not_allowed)),
            )
            .route("/health", web::get().to(handlers::health_check))
            .default_service(web::to(handlers::not_found)),
    )
    .route("/", web::get().to(handlers::index))
    .route("/index.html", web::get().to(handlers::index))
    .service(
        fs::Files::new("/", &config.static_dir)
            .default_handler(web::to(handlers::not_found)),
    );
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use tera::Tera;

    use super::configure;
    use crate::chat::reply::NO_REPLY_MESSAGE;
    use crate::config::Config;
    use crate::model::{InferenceClient, InferenceInput};
    use crate::web::models::ChatResponse;
    use crate::AppState;

    /// Answers every call with the same scripted result and records the input.
    struct ScriptedClient {
        reply: Result<Option<Value>, String>,
        calls: AtomicUsize,
        last_input: Mutex<Option<Value>>,
    }

    impl ScriptedClient {
        fn new(reply: Result<Option<Value>, String>) -> Arc<Self> {
            Arc::new(Self {
                reply,
                calls: AtomicUsize::new(0),
                last_input: Mutex::new(None),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn last_messages(&self) -> Value {
            self.last_input.lock().unwrap().clone().unwrap()["messages"].clone()
        }
    }

    #[async_trait]
    impl InferenceClient for ScriptedClient {
        async fn run(&self, _model_id: &str, input: &InferenceInput) -> Result<Option<Value>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_input.lock().unwrap() = Some(serde_json::to_value(input)?);
            self.reply.clone().map_err(|e| anyhow!(e))
        }
    }

    fn state(client: Arc<ScriptedClient>) -> actix_web::web::Data<AppState> {
        let root = env!("CARGO_MANIFEST_DIR");
        let template_dir = format!("{}/templates", root);
        let static_dir = format!("{}/static", root);
        let config = Config::from_lookup(|key| match key {
            "CLOUDFLARE_ACCOUNT_ID" => Some("acct".to_string()),
            "CLOUDFLARE_API_TOKEN" => Some("token".to_string()),
            "SYSTEM_PROMPT" => Some("sys".to_string()),
            "TEMPLATE_DIR" => Some(template_dir.clone()),
            "STATIC_DIR" => Some(static_dir.clone()),
            "MAX_BODY_BYTES" => Some("4096".to_string()),
            _ => None,
        })
        .unwrap();
        let tera = Tera::new(&format!("{}/**/*", config.template_dir)).unwrap();

        actix_web::web::Data::new(AppState {
            tera,
            client,
            config,
        })
    }

    macro_rules! init_app {
        ($state:expr) => {
            test::init_service(
                App::new()
                    .app_data($state.clone())
                    .configure(|cfg| configure(cfg, &$state.config)),
            )
            .await
        };
    }

    async fn post_chat(client: Arc<ScriptedClient>, body: Value) -> (StatusCode, String) {
        let state = state(client);
        let app = init_app!(state);
        let req = test::TestRequest::post()
            .uri("/api/chat")
            .set_json(body)
            .to_request();
        let resp = test::call_service(&app, req).await;
        let status = resp.status();
        let body: ChatResponse = test::read_body_json(resp).await;
        (status, body.response)
    }

    #[actix_web::test]
    async fn test_chat_returns_model_reply() {
        let client = ScriptedClient::new(Ok(Some(json!({ "response": "hi there" }))));
        let (status, response) =
            post_chat(client.clone(), json!({ "prompt": "hello", "history": [] })).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(response, "hi there");
        assert_eq!(client.calls(), 1);
        assert_eq!(
            client.last_messages(),
            json!([
                { "role": "system", "content": "sys" },
                { "role": "user", "content": [{ "type": "text", "text": "hello" }] }
            ])
        );
    }

    #[actix_web::test]
    async fn test_chat_empty_input_skips_model() {
        let client = ScriptedClient::new(Ok(Some(json!("unused"))));
        let (status, response) = post_chat(
            client.clone(),
            json!({ "prompt": "", "image": null, "history": [] }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(response, "Please say something or upload an image.");
        assert_eq!(client.calls(), 0);
    }

    #[actix_web::test]
    async fn test_chat_forwards_text_then_image() {
        let client = ScriptedClient::new(Ok(Some(json!({ "result": { "response": "a cat" } }))));
        let (_, response) = post_chat(
            client.clone(),
            json!({
                "prompt": "describe this",
                "image": "data:image/png;base64,AAAA",
                "history": []
            }),
        )
        .await;

        assert_eq!(response, "a cat");
        assert_eq!(
            client.last_messages()[1]["content"],
            json!([
                { "type": "text", "text": "describe this" },
                { "type": "image_url", "image_url": { "url": "data:image/png;base64,AAAA" } }
            ])
        );
    }

    #[actix_web::test]
    async fn test_chat_drops_history_images() {
        let client = ScriptedClient::new(Ok(Some(json!("sure"))));
        post_chat(
            client.clone(),
            json!({
                "prompt": "and this?",
                "history": [
                    { "role": "user", "content": [
                        { "type": "text", "text": "what is it" },
                        { "type": "image_url", "image_url": { "url": "data:image/png;base64,AAAA" } }
                    ]},
                    { "role": "assistant", "content": "a dog" }
                ]
            }),
        )
        .await;

        let messages = client.last_messages();
        assert_eq!(messages[1], json!({ "role": "user", "content": "what is it" }));
        assert_eq!(messages[2], json!({ "role": "assistant", "content": "a dog" }));
        assert!(!messages.to_string().contains("image_url"));
        assert_eq!(messages.as_array().unwrap().len(), 4);
    }

    #[actix_web::test]
    async fn test_chat_provider_failure_is_a_reply() {
        let client = ScriptedClient::new(Err("quota exceeded".to_string()));
        let (status, response) = post_chat(client.clone(), json!({ "prompt": "hello" })).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(response, "Error: quota exceeded");
        assert_eq!(client.calls(), 1);
    }

    #[actix_web::test]
    async fn test_chat_missing_provider_result() {
        let client = ScriptedClient::new(Ok(None));
        let (_, response) = post_chat(client, json!({ "prompt": "hello" })).await;
        assert_eq!(response, NO_REPLY_MESSAGE);
    }

    #[actix_web::test]
    async fn test_chat_invalid_image_skips_model() {
        let client = ScriptedClient::new(Ok(Some(json!("unused"))));
        let (status, response) = post_chat(
            client.clone(),
            json!({ "prompt": "look", "image": "https://example.com/cat.png" }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert!(response.starts_with("Error: invalid image"));
        assert_eq!(client.calls(), 0);
    }

    #[actix_web::test]
    async fn test_chat_bad_body_is_a_reply() {
        let client = ScriptedClient::new(Ok(Some(json!("unused"))));
        let state = state(client.clone());
        let app = init_app!(state);

        let req = test::TestRequest::post()
            .uri("/api/chat")
            .insert_header(("content-type", "application/json"))
            .set_payload("{ not json")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: ChatResponse = test::read_body_json(resp).await;
        assert!(body.response.starts_with("Error: "));

        // Larger than MAX_BODY_BYTES.
        let req = test::TestRequest::post()
            .uri("/api/chat")
            .set_json(json!({ "prompt": "x".repeat(8192) }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: ChatResponse = test::read_body_json(resp).await;
        assert!(body.response.starts_with("Error: "));

        assert_eq!(client.calls(), 0);
    }

    #[actix_web::test]
    async fn test_routing() {
        let state = state(ScriptedClient::new(Ok(None)));
        let app = init_app!(state);

        let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = test::read_body(resp).await;
        assert!(String::from_utf8_lossy(&body).contains("Kam GPT"));

        let resp =
            test::call_service(&app, test::TestRequest::get().uri("/app.js").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = test::call_service(
            &app,
            test::TestRequest::get().uri("/api/health").to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "ok");

        let resp =
            test::call_service(&app, test::TestRequest::get().uri("/api/chat").to_request()).await;
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);

        for uri in ["/api/unknown", "/missing.txt"] {
            let resp =
                test::call_service(&app, test::TestRequest::get().uri(uri).to_request()).await;
            assert_eq!(resp.status(), StatusCode::NOT_FOUND, "{}", uri);
            assert_eq!(test::read_body(resp).await, "Not found");
        }
    }
}
