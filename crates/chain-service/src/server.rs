//! Scrape endpoint for metrics and health.

use axum::{
	extract::State,
	http::{header, StatusCode},
	response::{IntoResponse, Json},
	routing::get,
	Router,
};
use chain_metrics::{ChainMetrics, HealthStatus};
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Clone)]
pub struct AppState {
	pub metrics: Arc<dyn ChainMetrics>,
}

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/metrics", get(handle_metrics))
		.route("/health", get(handle_health))
		.with_state(state)
}

/// Serves until `shutdown` resolves.
pub async fn serve(
	bind_address: &str,
	state: AppState,
	shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
	let listener = TcpListener::bind(bind_address).await?;
	tracing::info!("Metrics endpoint listening on {}", bind_address);

	axum::serve(listener, router(state))
		.with_graceful_shutdown(shutdown)
		.await?;
	Ok(())
}

/// GET /metrics: Prometheus text exposition.
async fn handle_metrics(State(state): State<AppState>) -> impl IntoResponse {
	(
		[(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
		state.metrics.export(),
	)
}

/// GET /health: 200 unless the verdict is Down.
async fn handle_health(State(state): State<AppState>) -> (StatusCode, Json<HealthStatus>) {
	let health = state.metrics.get_health_status();
	let code = if health.is_down() {
		StatusCode::SERVICE_UNAVAILABLE
	} else {
		StatusCode::OK
	};
	(code, Json(health))
}

#[cfg(test)]
mod tests {
	use super::*;
	use chain_metrics::{HealthState, Operation, PrometheusMetrics};
	use std::time::Duration;

	fn state() -> AppState {
		AppState {
			metrics: Arc::new(PrometheusMetrics::new()),
		}
	}

	#[tokio::test]
	async fn test_metrics_body() {
		let state = state();
		state
			.metrics
			.record_operation("ethereum", Operation::Build, Duration::from_millis(3), true);

		let response = handle_metrics(State(state)).await.into_response();
		assert_eq!(response.status(), StatusCode::OK);
		assert_eq!(
			response.headers()[header::CONTENT_TYPE],
			"text/plain; version=0.0.4"
		);
	}

	#[tokio::test]
	async fn test_health_without_data_is_ok() {
		let (code, Json(health)) = handle_health(State(state())).await;
		assert_eq!(code, StatusCode::OK);
		assert_eq!(health.status, HealthState::Ok);
	}
}
