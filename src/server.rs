use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::{net::SocketAddr, sync::Arc};
use tower_http::trace::TraceLayer;

use crate::{
    handler::RequestHandler,
    types::{ChatReply, ChatRequest},
};

#[derive(Clone)]
pub struct AppState {
    pub handler: Arc<RequestHandler>,
}

// Both replies and pipeline errors are 200; the payload key tells them apart.
async fn chatbot(State(state): State<AppState>, Json(req): Json<ChatRequest>) -> Json<ChatReply> {
    Json(state.handler.handle(&req.message))
}

async fn liveness() -> Json<serde_json::Value> {
    Json(json!({
        "status": "alive",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

pub fn router(handler: Arc<RequestHandler>) -> Router {
    Router::new()
        .route("/chatbot", post(chatbot))
        .route("/health", get(liveness))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { handler })
}

pub async fn serve(handler: Arc<RequestHandler>, addr: SocketAddr) -> anyhow::Result<()> {
    let app = router(handler);
    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
