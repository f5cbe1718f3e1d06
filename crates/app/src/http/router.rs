use axum::routing::get;
use axum::Router;

use crate::http::routes::health;
use crate::state::AppState;

pub fn build(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .with_state(state)
}
