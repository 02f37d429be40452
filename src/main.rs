use actix_cors::Cors;
use actix_files::Files;
use actix_web::{http, web, App, HttpServer};
use dotenv::dotenv;
use std::sync::Arc;

mod api;
mod auth;
mod config;
mod db;
mod error;
mod services;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if it exists
    dotenv().ok();

    // Initialize logger
    env_logger::init();

    // Load configuration
    let config = config::AppConfig::new().expect("Failed to load configuration");
    let config = Arc::new(config);

    log::info!(
        "Starting server on {}:{}",
        config.server.host,
        config.server.port
    );

    // Staging area for multipart uploads on their way to the media store
    tokio::fs::create_dir_all(&config.storage.staging_path)
        .await
        .expect("Failed to create staging directory");
    tokio::fs::create_dir_all(&config.storage.public_path)
        .await
        .expect("Failed to create public directory");

    // Create DB pool
    let pool = db::create_pool(
        &config.database.url,
        config.database.max_connections as usize,
    )
    .await;

    // Client for the external media storage service
    let media = services::media::MediaStore::new(&config.media);

    let c = config.clone();
    // Start HTTP server
    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&c.cors.allowed_origin)
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS", "PATCH"])
            .allowed_headers(vec![http::header::CONTENT_TYPE, http::header::AUTHORIZATION])
            .supports_credentials();

        App::new()
            .service(Files::new("/public", c.storage.public_path.clone()))
            .app_data(web::Data::new(pool.clone()))
            .app_data(web::Data::new(media.clone()))
            .app_data(web::Data::new(c.clone()))
            .app_data(web::JsonConfig::default().limit(c.server.json_body_limit))
            .wrap(cors)
            .route("/", web::get().to(api::running))
            .configure(api::configure)
    })
    .bind((config.server.host.clone(), config.server.port))?
    .run()
    .await
}
