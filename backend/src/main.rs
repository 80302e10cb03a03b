use actix_cors::Cors;
use actix_web::{get, web, App, HttpResponse, HttpServer, Responder};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use backend::api;
use backend::db;
use backend::repository::SqliteCatalog;
use backend::services::Engine;

#[get("/")]
async fn hello() -> impl Responder {
    HttpResponse::Ok().body("Hearth Control Plane Running!")
}

fn env_or(key: &str, fallback: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| fallback.to_string())
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let db_path = env_or("DB_PATH", "./hearth.db");
    let pool = db::init_pool(&db_path);

    let tick = match humantime::parse_duration(&env_or("AUTOMATIONS_INTERVAL", "60s")) {
        Ok(d) => d,
        Err(e) => {
            log::error!("invalid AUTOMATIONS_INTERVAL: {}", e);
            std::process::exit(1);
        }
    };

    let engine = Arc::new(Engine::new(Arc::new(SqliteCatalog::new(pool.clone()))));

    // Runner errors are observable here; the bounded channel and the
    // non-blocking sends inside the runner keep a slow drain from stalling it.
    let (errs_tx, mut errs_rx) = mpsc::channel(100);
    tokio::spawn(async move {
        while let Some(err) = errs_rx.recv().await {
            log::error!("automation runner error: {}", err);
        }
    });

    let token = CancellationToken::new();
    {
        let engine = engine.clone();
        let token = token.child_token();
        tokio::spawn(async move {
            engine.run_automations(token, tick, errs_tx).await;
        });
    }
    log::info!("Automation runner started, tick interval {:?}", tick);

    let addr = env_or("HTTP_ADDR", "127.0.0.1:8080");
    log::info!("Starting HTTP server at http://{}", addr);

    let engine_data = web::Data::from(engine);
    let result = HttpServer::new(move || {
        App::new()
            .wrap(Cors::permissive())
            .app_data(web::Data::new(pool.clone()))
            .app_data(engine_data.clone())
            .service(hello)
            .configure(api::config)
    })
    .bind(addr)?
    .run()
    .await;

    token.cancel();
    result
}
