use actix_web::{HttpResponse, Responder, delete, get, post, web};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use super::ErrorResponse;
use crate::error::JudgeError;
use crate::judge::{CaseStatus, TestCase, fail_pending};
use crate::progress::{ProgressBoard, ProgressSnapshot};
use crate::queue::JobQueue;
use crate::sandbox::lookup;

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct JudgeRequest {
    pub language: String,
    pub source_code: String,
    pub test_cases: Vec<TestCase>,
}

pub type JudgeReply = Result<Vec<TestCase>, JudgeError>;

pub enum JudgeMessage {
    FireAndForget {
        run_id: u32,
        request: JudgeRequest,
    },
    Blocking {
        run_id: u32,
        request: JudgeRequest,
        responder: oneshot::Sender<JudgeReply>,
    },
}

impl JudgeMessage {
    pub fn id(&self) -> u32 {
        match self {
            Self::FireAndForget { run_id, .. } => *run_id,
            Self::Blocking { run_id, .. } => *run_id,
        }
    }

    pub fn into_parts(self) -> (JudgeRequest, Option<oneshot::Sender<JudgeReply>>) {
        match self {
            Self::FireAndForget { request, .. } => (request, None),
            Self::Blocking {
                request, responder, ..
            } => (request, Some(responder)),
        }
    }
}

#[derive(Deserialize)]
pub struct JudgeQuery {
    #[serde(default)]
    pub blocking: bool,
}

#[post("/judge")]
pub async fn post_judge_handler(
    queue: web::Data<JobQueue>,
    board: web::Data<ProgressBoard>,
    query: web::Query<JudgeQuery>,
    body: web::Json<JudgeRequest>,
) -> impl Responder {
    let request = body.into_inner();
    if let Err(e) = lookup(&request.language) {
        return ErrorResponse::invalid_argument(e.to_string());
    }

    let run_id = queue.next_run_id();

    // Pollers see the new run as soon as it is accepted
    let mut waiting = request.test_cases.clone();
    for case in waiting.iter_mut() {
        case.status = CaseStatus::Waiting;
        case.actual_output.clear();
    }
    board.publish(run_id, &waiting);

    if query.blocking {
        let (tx, rx) = oneshot::channel::<JudgeReply>();
        queue
            .push(JudgeMessage::Blocking {
                run_id,
                request,
                responder: tx,
            })
            .await;
        log::debug!("Sent blocking run {run_id} to queue");

        match rx.await {
            Ok(Ok(cases)) => {
                log::info!("Received final result of blocking run {run_id}");
                HttpResponse::Ok().json(ProgressSnapshot::new(run_id, cases))
            }
            Ok(Err(e @ (JudgeError::UnsupportedLanguage(_) | JudgeError::MissingToolchain(_)))) => {
                ErrorResponse::invalid_argument(e.to_string())
            }
            Ok(Err(e)) => ErrorResponse::internal(e.to_string()),
            Err(e) => {
                log::error!("Failed to receive run {run_id} result: {e}");
                ErrorResponse::internal("Run was cancelled or aborted.")
            }
        }
    } else {
        queue
            .push(JudgeMessage::FireAndForget { run_id, request })
            .await;
        log::debug!("Sent non-blocking run {run_id} to queue");

        HttpResponse::Ok().json(ProgressSnapshot::new(run_id, waiting))
    }
}

/// Latest progress of the current or last run
#[get("/judge")]
pub async fn get_judge_handler(board: web::Data<ProgressBoard>) -> impl Responder {
    HttpResponse::Ok().json(board.snapshot())
}

#[delete("/judge/{run_id}")]
pub async fn delete_judge_handler(
    queue: web::Data<JobQueue>,
    board: web::Data<ProgressBoard>,
    path: web::Path<u32>,
) -> impl Responder {
    let run_id = path.into_inner();
    if queue.cancel_job(run_id).await {
        log::info!("Cancelled run {run_id}");
        // A run dropped from the queue never reaches the worker, settle its cases here
        let snapshot = board.snapshot();
        if snapshot.run_id == Some(run_id) {
            let mut cases = snapshot.test_cases;
            fail_pending(&mut cases, &JudgeError::Cancelled);
            board.publish(run_id, &cases);
        }
        HttpResponse::Ok().finish()
    } else {
        ErrorResponse::not_found(format!("Run {run_id} is not queued or running."))
    }
}
