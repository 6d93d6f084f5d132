use axum::{routing::{get, post}, Router};
use crate::controllers::journey_controller::{
    simulate, get_defaults,
    get_offline_mode, set_offline_mode,
};
use crate::shared_state::AppState;

/// Build the `/api/*` sub-router.
pub fn journey_routes(state: AppState) -> Router {
    Router::new()
        .route("/simulate",               post(simulate))
        .route("/defaults",               get(get_defaults))
        .route("/settings/offline-mode",  get(get_offline_mode).post(set_offline_mode))
        .with_state(state)
}
