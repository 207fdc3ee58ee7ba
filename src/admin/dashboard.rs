use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    response::{Html, IntoResponse},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

use crate::admin::service::AdminShared;

#[derive(Clone)]
pub struct DashboardState {
    pub shared: Arc<AdminShared>,
}

#[derive(Serialize)]
struct PlantRow {
    plant_id: String,
    tiebreak: u64,
    address: String,
    port: u16,
}

#[derive(Serialize)]
struct DemandRow {
    request_id: String,
    amount_kwh: f64,
    created_at: String,
    claimed_by: Option<String>,
}

#[derive(Serialize)]
struct PollutionRow {
    plant_id: String,
    averages: Vec<f64>,
    reported_at: String,
}

pub async fn run_dashboard(addr: SocketAddr, state: DashboardState) {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/", get(index_handler))
        .route("/api/plants", get(plants_handler))
        .route("/api/demands", get(demands_handler))
        .route("/api/pollution", get(pollution_handler))
        .layer(cors)
        .with_state(state);

    tracing::info!(addr = %addr, "Starting admin dashboard");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "Failed to bind dashboard");
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "Dashboard server failed");
    }
}

async fn index_handler() -> Html<&'static str> {
    Html(include_str!("index.html"))
}

async fn plants_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    let registry = state.shared.registry.lock().await;
    let plants: Vec<PlantRow> = registry
        .all()
        .iter()
        .map(|p| PlantRow {
            plant_id: p.plant_id.clone(),
            tiebreak: p.tiebreak,
            address: p.address.clone(),
            port: p.port,
        })
        .collect();
    Json(plants)
}

async fn demands_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    let book = state.shared.book.lock().await;
    let demands: Vec<DemandRow> = book
        .all()
        .into_iter()
        .map(|e| DemandRow {
            request_id: e.request.id.to_string(),
            amount_kwh: e.request.amount_kwh,
            created_at: e.request.created_at.to_rfc3339(),
            claimed_by: e.claimed_by,
        })
        .collect();
    Json(demands)
}

async fn pollution_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    let pollution = state.shared.pollution.lock().await;
    let rows: Vec<PollutionRow> = pollution
        .iter()
        .map(|e| PollutionRow {
            plant_id: e.plant_id.clone(),
            averages: e.averages.clone(),
            reported_at: e.reported_at.to_rfc3339(),
        })
        .collect();
    Json(rows)
}
