pub mod auth;
pub mod callcontrol;
pub mod health;
pub mod observer;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

use crate::runtime::turn::audio_ws;
use crate::state::AppState;

/// Build the full API router.
///
/// Routes are split into **public** (no auth required) and **protected**
/// (gated behind the `VA_API_TOKEN` bearer-token middleware). The caller
/// audio socket and call-control webhook stay public: the former is
/// authenticated by call-control possessing an unguessable `call_id`, the
/// latter by the provider's own callback-URL secrecy (§7); everything an
/// operator would use to inspect a running gateway sits behind the token.
pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/v1/health", get(health::health))
        .route("/v1/ready", get(health::readiness))
        .route("/ws/audio/:call_id", get(audio_ws))
        .route("/callcontrol/events", post(callcontrol::webhook));

    let protected = Router::new()
        .route("/v1/metrics", get(health::metrics))
        .route("/calls", post(callcontrol::initiate_call))
        .route("/ws/observer", get(observer::observer_ws))
        .route_layer(middleware::from_fn_with_state(
            state,
            auth::require_api_token,
        ));

    public
        .merge(protected)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
