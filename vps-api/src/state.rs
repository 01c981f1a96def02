use vps_orchestrator::VpsOrchestrator;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: VpsOrchestrator,
}

impl AppState {
    pub fn new(orchestrator: VpsOrchestrator) -> Self {
        Self { orchestrator }
    }
}
