mod judge;
mod run;
mod session;
mod settings;

pub use judge::*;
pub use run::*;
pub use session::*;
pub use settings::*;

use actix_web::error::{InternalError, JsonPayloadError};
use actix_web::{HttpRequest, HttpResponse, Responder, post, web};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

#[derive(Serialize)]
struct ErrorResponse {
    reason: &'static str,
    code: u32,
    message: String,
}

impl ErrorResponse {
    fn invalid_argument(message: impl Into<String>) -> HttpResponse {
        HttpResponse::BadRequest().json(Self {
            reason: "ERR_INVALID_ARGUMENT",
            code: 1,
            message: message.into(),
        })
    }

    fn not_found(message: impl Into<String>) -> HttpResponse {
        HttpResponse::NotFound().json(Self {
            reason: "ERR_NOT_FOUND",
            code: 3,
            message: message.into(),
        })
    }

    fn external(message: impl Into<String>) -> HttpResponse {
        HttpResponse::InternalServerError().json(Self {
            reason: "ERR_EXTERNAL",
            code: 5,
            message: message.into(),
        })
    }

    fn internal(message: impl Into<String>) -> HttpResponse {
        HttpResponse::InternalServerError().json(Self {
            reason: "ERR_INTERNAL",
            code: 6,
            message: message.into(),
        })
    }
}

pub fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let response = ErrorResponse::invalid_argument(err.to_string());
    InternalError::from_response(err, response).into()
}

/// Registers every endpoint; shared by the server and the tests
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(get_settings_handler)
        .service(put_settings_handler)
        .service(post_run_handler)
        .service(post_judge_handler)
        .service(get_judge_handler)
        .service(delete_judge_handler)
        .service(get_session_handler)
        .service(put_session_handler)
        .service(exit);
}

/// Lets the host application stop the server when it closes
#[post("/internal/exit")]
pub async fn exit(shutdown: web::Data<CancellationToken>) -> impl Responder {
    log::info!("Shutdown as requested");
    shutdown.cancel();
    "Exiting".to_string()
}
