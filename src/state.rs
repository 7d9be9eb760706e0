//! Application state shared by HTTP handlers and background tasks.

use std::sync::Arc;
use tokio::time::Instant;

use crate::broadcast::SessionBroadcaster;
use crate::cache::SampleCache;
use crate::config::Config;
use crate::terminate::TerminationController;

/// Type alias for shared application state.
pub type SharedState = Arc<AppState>;

/// Global application state, constructed once at process start and handed by
/// reference to every handler. No module-level singletons.
pub struct AppState {
    pub config: Arc<Config>,
    pub cache: Arc<SampleCache>,
    pub broadcaster: SessionBroadcaster,
    pub controller: Arc<TerminationController>,
    pub started_at: Instant,
}
