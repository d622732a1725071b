use livepoll_config::Settings;
use livepoll_services::{Infrastructure, Services};

#[derive(Clone)]
pub struct AppState {
    pub settings: Settings,
    pub services: Services,
}

impl AppState {
    pub fn new(infra: &Infrastructure, settings: Settings) -> Self {
        let services = infra.services(&settings);
        Self { settings, services }
    }
}
