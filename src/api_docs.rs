use utoipa::OpenApi;
use crate::controllers::journey_controller;
use crate::models::journey;

#[derive(OpenApi)]
#[openapi(
    paths(
        journey_controller::simulate,
        journey_controller::get_defaults,
        journey_controller::get_offline_mode,
        journey_controller::set_offline_mode
    ),
    components(
        schemas(
            journey::SimulateRequest,
            journey::SimulateResponse,
            journey::Sample,
            journey::Waypoint,
            journey::ErrorResponse,
            journey::FormDefaults,
            journey::OfflineModeSetting
        )
    ),
    tags(
        (name = "journey-solar-sim", description = "Journey Solar Production API")
    )
)]
pub struct ApiDoc;
