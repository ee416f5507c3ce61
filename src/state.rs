use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::Store;
use crate::services::orchestrator::AppointmentOrchestrator;

pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn Store>,
    pub orchestrator: AppointmentOrchestrator,
}
