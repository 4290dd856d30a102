use crate::service::CityService;

pub struct AppState {
    pub service: CityService,
}
