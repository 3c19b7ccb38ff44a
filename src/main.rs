use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use psjudge::config::{CliArgs, Config, Settings};
use psjudge::database as db;
use psjudge::progress::ProgressBoard;
use psjudge::queue::JobQueue;
use psjudge::web_server::build_server;
use psjudge::worker::worker;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let cli = CliArgs::parse();
    let Config {
        server: server_config,
        judge: judge_config,
        toolchains,
    } = cli.to_config()?;

    let db_path = db::get_db_path()?;
    if cli.flush_data {
        db::remove_db(&db_path);
    }
    let db_pool = Arc::new(db::init_db(&db_path).await?);

    // Paths saved from the settings page win over the configuration file
    let toolchains = match db::load_toolchains(db_pool.clone()).await? {
        Some(stored) => {
            log::info!("Using stored toolchain settings");
            stored
        }
        None => toolchains,
    };
    if let Err(e) = toolchains.validate() {
        log::warn!("{e}, runs in that language will fail until it is set");
    }

    let settings = Arc::new(Settings::new(toolchains, judge_config));
    let job_queue = Arc::new(JobQueue::new());
    let board = Arc::new(ProgressBoard::new());
    let shutdown_token = CancellationToken::new();

    // ======= PREPARATION END, EXECUTION START =======

    let mut worker_task = tokio::spawn(worker(
        settings.clone(),
        db_pool.clone(),
        job_queue.clone(),
        board.clone(),
        shutdown_token.child_token(),
    ));

    let server = build_server(
        server_config,
        settings,
        db_pool,
        job_queue,
        board,
        shutdown_token.clone(),
    )?;

    let server_handle = server.handle();
    let server_task = actix_web::rt::spawn(server);

    // ===== EXECUTION END, WAITING FOR SHUTDOWN ======

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            log::info!("Ctrl-c received, shutting down...");
        }
        _ = shutdown_token.cancelled() => {
            log::info!("Exit requested, shutting down...");
        }
        res_server = server_task => {
            log::error!("Server terminated unexpectedly: {:?}", res_server);
        }
        res_worker = &mut worker_task => {
            log::error!("Judge worker terminated unexpectedly: {:?}", res_worker);
        }
    }

    // 1. Shutdown actix-web server gracefully
    server_handle.stop(true).await;

    // 2. Stop the worker, cancelling the run in progress
    shutdown_token.cancel();
    log::info!("Shutdown signal sent to judge worker, waiting for it to finish...");

    // 3. Wait until the worker terminates
    if !worker_task.is_finished() {
        match worker_task.await {
            Ok(Err(e)) => log::error!("Judge worker finished with error: {e:?}"),
            Err(e) if e.is_panic() => log::error!("Judge worker panicked: {e:?}"),
            Err(e) => log::error!("Judge worker handle finished with error: {e:?}"),
            Ok(Ok(())) => {}
        }
    }

    log::info!("Shutdown complete");
    Ok(())
}
