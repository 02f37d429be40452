// src/api/mod.rs
pub mod health;
pub mod shared;
pub mod videos;

use actix_web::{web, HttpResponse};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .configure(videos::configure)
            .configure(health::configure),
    );
}

/// Bare liveness probe mounted at the root.
pub async fn running() -> HttpResponse {
    HttpResponse::Ok().body("Running")
}
