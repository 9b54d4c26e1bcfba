//! Operator HTTP API: health, status counters, forced mixes and local
//! model updates.
use std::{borrow::Cow, collections::HashMap, sync::Arc, time::Duration};

use axum::{
    error_handling::HandleErrorLayer,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing, Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tower::{BoxError, ServiceBuilder};
use tower_http::trace::TraceLayer;

use crate::cli::{APP_NAME, APP_VERSION};
use crate::error::Result;
use crate::mixer::PushMixer;
use crate::model::AveragedWeights;

#[derive(Clone)]
pub struct ApiState {
    pub mixer: PushMixer,
    pub model: Arc<RwLock<AveragedWeights>>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/", routing::get(root))
        .route("/health", routing::get(health))
        .route("/about", routing::get(about))
        .route("/status", routing::get(status))
        .route("/mix", routing::post(force_mix))
        .route("/update", routing::post(apply_update))
        .layer(
            ServiceBuilder::new()
                // Handle errors from middleware
                .layer(HandleErrorLayer::new(handle_error))
                .load_shed()
                .timeout(Duration::from_secs(10))
                .layer(TraceLayer::new_for_http()),
        )
        .with_state(state)
}

// basic handler that responds with a static string
async fn root() -> &'static str {
    "Welcome to Quillon"
}

async fn health() -> &'static str {
    "OK"
}

#[derive(Serialize, Deserialize)]
pub struct AboutResponse {
    name: String,
    version: String,
}

impl Default for AboutResponse {
    fn default() -> Self {
        Self {
            name: APP_NAME.to_string(),
            version: APP_VERSION.to_string(),
        }
    }
}

async fn about() -> Json<AboutResponse> {
    Json(AboutResponse::default())
}

async fn status(State(state): State<ApiState>) -> Json<HashMap<String, String>> {
    Json(state.mixer.status().await)
}

#[derive(Serialize, Deserialize)]
pub struct MixTriggerResponse {
    pub mixed: bool,
}

async fn force_mix(State(state): State<ApiState>) -> Json<MixTriggerResponse> {
    let mixed = state.mixer.do_mix().await;
    Json(MixTriggerResponse { mixed })
}

#[derive(Serialize, Deserialize)]
pub struct UpdateRequest {
    pub delta: Vec<f64>,
}

#[derive(Serialize, Deserialize)]
pub struct UpdateResponse {
    pub local_updates: u64,
}

async fn apply_update(
    State(state): State<ApiState>,
    Json(request): Json<UpdateRequest>,
) -> Result<Json<UpdateResponse>> {
    let local_updates = {
        let mut model = state.model.write().await;
        model.apply_update(&request.delta)?;
        model.local_updates()
    };
    state.mixer.notify_updated().await;
    Ok(Json(UpdateResponse { local_updates }))
}

async fn handle_error(error: BoxError) -> impl IntoResponse {
    if error.is::<tower::timeout::error::Elapsed>() {
        return (StatusCode::REQUEST_TIMEOUT, Cow::from("request timed out"));
    }

    if error.is::<tower::load_shed::error::Overloaded>() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Cow::from("service is overloaded, try again later"),
        );
    }

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Cow::from(format!("Unhandled internal error: {}", error)),
    )
}
