use std::sync::Arc;

use actix_web::{App, HttpServer, dev::Server, middleware, web};
use sqlx::sqlite::SqlitePool;
use tokio_util::sync::CancellationToken;

use crate::config::{ServerConfig, Settings};
use crate::progress::ProgressBoard;
use crate::queue::JobQueue;
use crate::routes::{configure, json_error_handler};

pub fn build_server(
    server_config: ServerConfig,
    settings: Arc<Settings>,
    db_pool: Arc<SqlitePool>,
    queue: Arc<JobQueue>,
    board: Arc<ProgressBoard>,
    shutdown: CancellationToken,
) -> std::io::Result<Server> {
    let settings = web::Data::from(settings);
    let db_pool = web::Data::from(db_pool);
    let queue = web::Data::from(queue);
    let board = web::Data::from(board);
    let shutdown = web::Data::new(shutdown);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(settings.clone())
            .app_data(db_pool.clone())
            .app_data(queue.clone())
            .app_data(board.clone())
            .app_data(shutdown.clone())
            .app_data(web::JsonConfig::default().error_handler(json_error_handler))
            .wrap(middleware::Logger::default())
            .configure(configure)
    })
    .bind((
        server_config
            .bind_address
            .unwrap_or("127.0.0.1".to_string()),
        server_config.bind_port.unwrap_or(12345),
    ))?
    .run();

    Ok(server)
}
