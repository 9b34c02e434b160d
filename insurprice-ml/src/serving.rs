//! HTTP surface: health, single-record prediction, and on-demand training.

use crate::data::DocumentSource;
use crate::pipeline::TrainPipeline;
use crate::predictor::{CostPredictor, InsuranceData, PredictError};
use crate::remote::ModelStore;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use insurprice_core::{PipelineConfig, Schema};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub const TRAIN_SUCCESS_MESSAGE: &str = "Training successful !!";

/// State shared by all handlers.
pub struct AppState {
    pub config: Arc<PipelineConfig>,
    pub schema: Arc<Schema>,
    pub source: Arc<dyn DocumentSource>,
    pub store: Arc<dyn ModelStore>,
    predictor: RwLock<Option<Arc<CostPredictor>>>,
    /// Held for the duration of a training run; the artifact area has one writer.
    training: Mutex<()>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(
        config: Arc<PipelineConfig>,
        schema: Arc<Schema>,
        source: Arc<dyn DocumentSource>,
        store: Arc<dyn ModelStore>,
    ) -> Self {
        Self {
            config,
            schema,
            source,
            store,
            predictor: RwLock::new(None),
            training: Mutex::new(()),
        }
    }

    /// Serve with an already loaded predictor instead of fetching the
    /// published model on first use.
    pub fn with_predictor(self, predictor: CostPredictor) -> Self {
        Self {
            predictor: RwLock::new(Some(Arc::new(predictor))),
            ..self
        }
    }

    pub async fn model_loaded(&self) -> bool {
        self.predictor.read().await.is_some()
    }

    /// The cached predictor, fetching the published model if none is loaded.
    pub async fn predictor(&self) -> Result<Arc<CostPredictor>, PredictError> {
        if let Some(p) = self.predictor.read().await.as_ref() {
            return Ok(Arc::clone(p));
        }
        let mut slot = self.predictor.write().await;
        if let Some(p) = slot.as_ref() {
            return Ok(Arc::clone(p));
        }
        let loaded = Arc::new(
            CostPredictor::from_store(
                self.store.as_ref(),
                &self.config.remote,
                &self.config.serving.model_cache_dir,
            )
            .await?,
        );
        *slot = Some(Arc::clone(&loaded));
        Ok(loaded)
    }
}

/// Build an axum Router with `/health`, `/predict` and `/train` routes.
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/predict", post(predict_handler))
        .route("/train", get(train_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_handler(State(state): State<SharedState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "model_loaded": state.model_loaded().await,
    }))
}

async fn predict_handler(
    State(state): State<SharedState>,
    Json(data): Json<InsuranceData>,
) -> Response {
    let result = match state.predictor().await {
        Ok(predictor) => predictor.predict(&data),
        Err(e) => Err(e),
    };
    match result {
        Ok(prediction) => Json(serde_json::json!({ "prediction": prediction })).into_response(),
        Err(e) => {
            warn!(error = %e, "Prediction failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "status": false, "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

async fn train_handler(State(state): State<SharedState>) -> Response {
    let _guard = state.training.lock().await;
    let mut pipeline = TrainPipeline::new(
        Arc::clone(&state.config),
        Arc::clone(&state.schema),
        Arc::clone(&state.source),
        Arc::clone(&state.store),
    );
    match pipeline.run().await {
        Ok(run) => {
            if run.publish.is_some() {
                // Next prediction picks up the newly published model.
                *state.predictor.write().await = None;
            }
            (StatusCode::OK, TRAIN_SUCCESS_MESSAGE).into_response()
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Error Occurred! {}", e.report()),
        )
            .into_response(),
    }
}

/// Start the prediction server on the configured address.
///
/// Runs until ctrl+c.
pub async fn run(state: SharedState) -> Result<(), std::io::Error> {
    let addr = format!(
        "{}:{}",
        state.config.serving.host, state.config.serving.port
    );
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, "Prediction server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for ctrl+c");
                std::future::pending::<()>().await;
            }
            info!("Shutdown signal received");
        })
        .await?;
    Ok(())
}
