use actix_web::{HttpResponse, Responder, post, web};
use serde::Deserialize;

use super::ErrorResponse;
use crate::config::{Language, Settings};
use crate::sandbox::{ExecutionRequest, Pipeline, RunReport};

#[derive(Deserialize, Debug)]
pub struct RunRequest {
    pub language: String,
    pub code: String,
    #[serde(default)]
    pub input: String,
}

/// Builds and runs one program against one input, outside the judge queue
#[post("/run")]
pub async fn post_run_handler(
    settings: web::Data<Settings>,
    body: web::Json<RunRequest>,
) -> impl Responder {
    let RunRequest {
        language,
        code,
        input,
    } = body.into_inner();

    let language = match language.parse::<Language>() {
        Ok(language) => language,
        Err(e) => return HttpResponse::Ok().json(RunReport::from(Err(e))),
    };

    let request = ExecutionRequest {
        language,
        source_code: code,
        stdin: input,
    };
    let pipeline = Pipeline::new(settings.toolchains(), settings.judge);

    match web::block(move || pipeline.build_and_run(&request)).await {
        Ok(outcome) => HttpResponse::Ok().json(RunReport::from(outcome)),
        Err(e) => {
            log::error!("Single run failed on the blocking pool: {e}");
            ErrorResponse::internal("Execution was interrupted.")
        }
    }
}
