use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use anyhow::{Context, Result};
use tracing::{event, Level};

use factbot_common::prelude::LivenessConfig;

pub const RUNNING: &str = "Bot is running!";

async fn running() -> impl Responder {
    HttpResponse::Ok().content_type("text/plain; charset=utf-8").body(RUNNING)
}

fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(running));
}

/// Serve the keep-alive endpoint until the process ends.
pub async fn serve(config: &LivenessConfig) -> Result<()> {
    event!(Level::INFO, "Liveness endpoint listening on {}:{}", config.bind, config.port);

    HttpServer::new(|| App::new().configure(routes))
        .workers(1)
        .bind((config.bind.as_str(), config.port))
        .with_context(|| format!("Error binding the liveness endpoint to {}:{}", config.bind, config.port))?
        .run()
        .await
        .with_context(|| "Liveness endpoint stopped")
}
