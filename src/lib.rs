pub mod app;
pub mod config;
pub mod domain;
pub mod http;
pub mod infra;

use crate::infra::{db::Db, realtime::RealtimeHub};

#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub hub: RealtimeHub,
    pub admin_token: Option<String>,
    pub retention_days: i64,
}
