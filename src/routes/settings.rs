use actix_web::{HttpResponse, Responder, get, put, web};
use sqlx::sqlite::SqlitePool;

use super::ErrorResponse;
use crate::config::{Settings, ToolchainConfig};
use crate::database as db;

#[get("/settings")]
pub async fn get_settings_handler(settings: web::Data<Settings>) -> impl Responder {
    HttpResponse::Ok().json(settings.toolchains())
}

#[put("/settings")]
pub async fn put_settings_handler(
    settings: web::Data<Settings>,
    pool: web::Data<SqlitePool>,
    body: web::Json<ToolchainConfig>,
) -> impl Responder {
    let toolchains = body.into_inner();
    if let Err(e) = toolchains.validate() {
        return ErrorResponse::invalid_argument(e.to_string());
    }

    if let Err(e) = db::save_toolchains(&toolchains, pool.into_inner()).await {
        log::error!("Failed to save toolchain settings: {e}");
        return ErrorResponse::external("Failed to save settings.");
    }

    settings.set_toolchains(toolchains.clone());
    log::info!("Toolchain settings updated");
    HttpResponse::Ok().json(toolchains)
}
