use std::sync::Arc;

use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;

use crate::config::Settings;
use crate::database as db;
use crate::error::JudgeError;
use crate::judge::{CaseStatus, Judge, TestCase, fail_pending};
use crate::progress::ProgressBoard;
use crate::queue::JobQueue;
use crate::sandbox::Pipeline;

/// Runs queued judging runs one after another until `token` is cancelled
///
/// Cancelling `token` also cancels the run in progress.
pub async fn worker(
    settings: Arc<Settings>,
    db_pool: Arc<SqlitePool>,
    queue: Arc<JobQueue>,
    board: Arc<ProgressBoard>,
    token: CancellationToken,
) -> anyhow::Result<()> {
    log::info!("Judge worker initialized");

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                log::info!("Judge worker received shutdown signal, stopping");
                break;
            }

            message = queue.pop() => {
                let run_id = message.id();
                let (request, responder) = message.into_parts();
                log::info!("Judge worker got run {run_id} from queue");

                // 1. Snapshot the toolchains and make the run cancellable
                let run_token = token.child_token();
                queue.begin(run_id, run_token.clone());
                let pipeline = Pipeline::new(settings.toolchains(), settings.judge)
                    .with_cancellation(run_token);

                // 2. Judge on the blocking pool, publishing every step
                let language = request.language.clone();
                let source_code = request.source_code.clone();
                let submitted = request.test_cases.clone();
                let board_ref = Arc::clone(&board);
                let result_handle = tokio::task::spawn_blocking(move || {
                    Judge::new(pipeline).run_all(
                        &request.language,
                        &request.source_code,
                        request.test_cases,
                        |cases| board_ref.publish(run_id, cases),
                    )
                });

                // 3. Give back control to the runtime until the run is done
                let result = result_handle.await;
                queue.finish(run_id);

                let reply = match result {
                    Ok(Ok(cases)) => {
                        log::info!("Run {run_id} finished");
                        db::save_judged_run(&language, &source_code, &cases, db_pool.clone())
                            .await
                            .unwrap_or_else(|e| log::error!("Failed to save run {run_id} results: {e}"));
                        Ok(cases)
                    }
                    Ok(Err(e)) => {
                        if e.is_fatal() {
                            log::warn!("Run {run_id} aborted: {e}");
                        } else {
                            log::error!("Run {run_id} failed outside of any case: {e}");
                        }
                        settle_aborted_run(&board, run_id, submitted, &e);
                        Err(e)
                    }
                    Err(e) => {
                        log::error!("Run {run_id} panicked on the judge worker: {e:?}");
                        settle_aborted_run(&board, run_id, submitted, &JudgeError::Crashed);
                        Err(JudgeError::Crashed)
                    }
                };

                // 4. Hand the result to a waiting caller, if any
                if let Some(responder) = responder {
                    if responder.send(reply).is_err() {
                        log::warn!("Failed to send run {run_id} result back to server");
                    } else {
                        log::debug!("Blocking run {run_id} result sent back");
                    }
                }
            }
        };
    }

    log::info!("Judge worker has shut down gracefully");
    Ok(())
}

/// Publishes a final list for a run that stopped without finishing its cases
///
/// Verdicts already on the board are kept; everything else fails with `error`.
fn settle_aborted_run(
    board: &ProgressBoard,
    run_id: u32,
    submitted: Vec<TestCase>,
    error: &JudgeError,
) {
    let snapshot = board.snapshot();
    let mut cases = if snapshot.run_id == Some(run_id) {
        snapshot.test_cases
    } else {
        // nothing of this run was published yet, old verdicts do not count
        submitted
            .into_iter()
            .map(|case| TestCase {
                status: CaseStatus::Waiting,
                ..case
            })
            .collect()
    };
    fail_pending(&mut cases, error);
    board.publish(run_id, &cases);
}
