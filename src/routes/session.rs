use actix_web::{HttpResponse, Responder, get, put, web};
use sqlx::sqlite::SqlitePool;

use super::ErrorResponse;
use crate::database as db;
use crate::session::SessionState;

#[get("/session")]
pub async fn get_session_handler(pool: web::Data<SqlitePool>) -> impl Responder {
    match db::load_session(pool.into_inner()).await {
        Ok(stored) => {
            let session = stored.unwrap_or_default().with_missing_templates();
            HttpResponse::Ok().json(session)
        }
        Err(e) => {
            log::error!("Failed to load last session: {e}");
            ErrorResponse::external("Failed to load session.")
        }
    }
}

#[put("/session")]
pub async fn put_session_handler(
    pool: web::Data<SqlitePool>,
    body: web::Json<SessionState>,
) -> impl Responder {
    let session = body.into_inner();
    match db::save_session(&session, pool.into_inner()).await {
        Ok(()) => HttpResponse::Ok().json(session),
        Err(e) => {
            log::error!("Failed to save session: {e}");
            ErrorResponse::external("Failed to save session.")
        }
    }
}
