use std::sync::Arc;

use reel_worker::SyncEngine;
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub engine: Arc<SyncEngine>,
    /// Background syncs started by the API stop when this fires.
    pub shutdown: CancellationToken,
    pub reel_env: String,
}

#[derive(Debug, Clone)]
pub struct RequestId(pub String);
