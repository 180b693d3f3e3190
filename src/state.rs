use std::sync::Arc;
use std::time::Duration;

use crate::services::query_cache::QueryCache;
use crate::store::ConstituentStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ConstituentStore>,
    pub cache: QueryCache,
    pub export_timeout: Duration,
}
