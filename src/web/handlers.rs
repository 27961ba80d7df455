use actix_web::error::{Error, InternalError, JsonPayloadError};
use actix_web::{web, HttpRequest, HttpResponse, Responder};
use log::{error, info, warn};
use serde_json::json;
use tera::Context;
use uuid::Uuid;

use crate::chat::{build_messages, normalize_reply};
use crate::error::ChatError;
use crate::model::InferenceInput;
use crate::web::models::{ChatRequest, ChatResponse};
use crate::AppState;

// Index page handler
pub async fn index(data: web::Data<AppState>) -> impl Responder {
    let mut context = Context::new();
    context.insert("assistant_name", &data.config.assistant_name);
    context.insert("model_id", &data.config.model_id);
    match data.tera.render("index.html", &context) {
        Ok(html) => HttpResponse::Ok().content_type("text/html").body(html),
        Err(e) => {
            error!("Template error: {}", e);
            HttpResponse::InternalServerError().body("Template error")
        }
    }
}

// Health check endpoint
pub async fn health_check(data: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(json!({ "status": "ok", "model": data.config.model_id }))
}

/// Chat API endpoint. Always answers 200 with `{ "response": ... }`; failures
/// become the text of the reply.
pub async fn chat(data: web::Data<AppState>, req: web::Json<ChatRequest>) -> impl Responder {
    let request_id = Uuid::new_v4();

    let response = match answer(&data, &req, request_id).await {
        Ok(text) => {
            info!("[{}] Reply length: {} characters", request_id, text.len());
            text
        }
        Err(e) => {
            match &e {
                ChatError::EmptyInput => warn!("[{}] Empty chat turn", request_id),
                ChatError::InvalidImage(reason) => {
                    warn!("[{}] Rejected image: {}", request_id, reason)
                }
                ChatError::Provider(cause) => error!("[{}] Model error: {:#}", request_id, cause),
            }
            e.user_message()
        }
    };

    HttpResponse::Ok().json(ChatResponse { response })
}

async fn answer(
    state: &AppState,
    req: &ChatRequest,
    request_id: Uuid,
) -> Result<String, ChatError> {
    info!(
        "[{}] Chat request: prompt {} chars, image: {}, history: {} turns ({} with images)",
        request_id,
        req.prompt.as_deref().map_or(0, str::len),
        req.image.as_deref().is_some_and(|i| !i.is_empty()),
        req.history.len(),
        req.history.iter().filter(|turn| turn.has_image()).count()
    );

    let messages = build_messages(
        req,
        &state.config.system_prompt,
        state.config.history_images,
    )?;
    let input = InferenceInput {
        messages,
        max_tokens: state.config.max_tokens,
    };

    let result = state.client.run(&state.config.model_id, &input).await?;
    Ok(normalize_reply(result))
}

/// Turns an unreadable chat body into a normal chat reply.
pub fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> Error {
    warn!("Rejected chat body: {}", err);
    let body = ChatResponse {
        response: format!("Error: {}", err),
    };
    InternalError::from_response(err, HttpResponse::Ok().json(body)).into()
}

pub async fn not_found() -> impl Responder {
    HttpResponse::NotFound()
        .content_type("text/plain")
        .body("Not found")
}

pub async fn method_not_allowed() -> impl Responder {
    HttpResponse::MethodNotAllowed()
        .content_type("text/plain")
        .body("Method not allowed")
}
