//! JSON API over the tool adapters.

pub mod middleware;
pub mod reply;
pub mod routes;
pub mod server;

use std::path::PathBuf;
use std::sync::Arc;

use crate::cancel::Superseder;
use crate::config::ToolgateConfig;
use crate::gate::AdmissionGate;
use crate::tools::Toolset;

pub use reply::{ApiError, ErrorBody};
pub use routes::create_router;
pub use server::serve;

/// Shared by every handler.
///
/// Tool invocations block, so handlers pass them through `gate` and await
/// the result. `chat` tracks the in-flight turn of each conversation so a
/// new turn kills the old one.
#[derive(Clone)]
pub struct AppState {
    pub tools: Arc<Toolset>,
    pub gate: AdmissionGate,
    pub chat: Arc<Superseder>,
    pub output_root: PathBuf,
}

impl AppState {
    pub fn from_config(cfg: &ToolgateConfig) -> Self {
        AppState {
            tools: Arc::new(Toolset::from_config(cfg)),
            gate: AdmissionGate::new(cfg.workers, cfg.queue_depth),
            chat: Arc::new(Superseder::new()),
            output_root: cfg.output_dir(),
        }
    }
}
