mod chat;
mod config;
mod error;
mod model;
mod web;

use std::sync::Arc;

use actix_web::{web::Data, App, HttpServer};
use dotenv::dotenv;
use log::{error, info};
use tera::Tera;

use config::Config;
use model::{InferenceClient, WorkersAiClient};
use web::routes;

// App state structure
struct AppState {
    tera: Tera,
    client: Arc<dyn InferenceClient>,
    config: Config,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize environment
    dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    info!("Starting vision chat application");

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {:#}", e);
            std::process::exit(1);
        }
    };
    info!(
        "Model: {} (max_tokens: {}, history images: {:?})",
        config.model_id, config.max_tokens, config.history_images
    );

    let client: Arc<dyn InferenceClient> = Arc::new(WorkersAiClient::new(
        config.base_url.clone(),
        config.account_id.clone(),
        config.api_token.clone(),
    ));

    // Initialize template engine
    let mut tera = match Tera::new(&format!("{}/**/*", config.template_dir)) {
        Ok(t) => t,
        Err(e) => {
            error!("Template parsing error: {}", e);
            std::process::exit(1);
        }
    };
    tera.autoescape_on(vec![".html"]);

    let bind = (config.bind_address.clone(), config.port);
    let app_state = Data::new(AppState {
        tera,
        client,
        config,
    });

    info!("Listening on {}:{}", bind.0, bind.1);

    // Start web server
    HttpServer::new(move || {
        let state = app_state.clone();
        App::new()
            .app_data(state.clone())
            .configure(|cfg| routes::configure(cfg, &state.config))
    })
    .bind(bind)?
    .run()
    .await
}
