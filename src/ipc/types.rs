use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::config::{self, GradingConfig};
use crate::db;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Session state. `config` mirrors the selected workspace's stored grading
/// config, or the built-in defaults when no workspace is open.
#[derive(Default)]
pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub config: GradingConfig,
}

impl AppState {
    /// Opens (or reopens) the workspace database and loads its grading config.
    pub fn open_workspace(&mut self, path: PathBuf) -> anyhow::Result<()> {
        let conn = db::open_db(&path)?;
        // A broken stored config must not keep the workspace from opening.
        let cfg = config::load(&conn).unwrap_or_else(|e| {
            tracing::warn!("stored grading config ignored: {:#}", e);
            GradingConfig::default()
        });
        tracing::info!(workspace = %path.display(), "workspace opened");
        self.workspace = Some(path);
        self.db = Some(conn);
        self.config = cfg;
        Ok(())
    }
}
