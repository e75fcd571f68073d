//! HTTP API Server
//!
//! REST API mapping broker registration, leadership queries, and failure
//! reports onto the coordination core. Route names follow the wire
//! contract the brokers already speak.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::coordinator::{Coordinator, FailoverOutcome};
use crate::error::{Error, Result};
use crate::state::BrokerNode;

/// Shared application state
pub struct AppState {
    /// The coordination core
    pub coordinator: Arc<Coordinator>,
}

/// HTTP API server
pub struct HttpServer {
    config: ApiConfig,
    state: Arc<AppState>,
}

impl HttpServer {
    /// Create a new HTTP server around the coordinator
    pub fn new(config: ApiConfig, coordinator: Arc<Coordinator>) -> Self {
        Self {
            config,
            state: Arc::new(AppState { coordinator }),
        }
    }

    /// Create the router
    fn create_router(state: Arc<AppState>, cors_enabled: bool) -> Router {
        let router = Router::new()
            // Membership
            .route("/register-broker", post(handle_register))
            .route("/deregister-broker/:unique_id", delete(handle_deregister))
            .route("/broker-registry", get(handle_registry))
            // Leadership queries
            .route("/fetch-leadBroker-elasticIP", get(handle_elastic_ip))
            .route("/getCurrent-leadBroker-PrivateIP", get(handle_leader_private_ip))
            .route("/get-peerBrokers-IPList", get(handle_peer_ip_list))
            // Failover entry point
            .route("/leader-not-responding", post(handle_leader_not_responding))
            // Liveness
            .route("/health", get(handle_health))
            .with_state(state)
            .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));

        if cors_enabled {
            router.layer(CorsLayer::permissive())
        } else {
            router
        }
    }

    /// Start the HTTP server
    pub async fn start(&self) -> Result<()> {
        if !self.config.enabled {
            tracing::info!("HTTP API disabled");
            return Ok(());
        }

        let app = Self::create_router(Arc::clone(&self.state), self.config.cors_enabled);

        let listener = tokio::net::TcpListener::bind(&self.config.bind_address).await?;
        tracing::info!("HTTP API listening on {}", self.config.bind_address);

        axum::serve(listener, app)
            .await
            .map_err(|e| Error::Internal(format!("HTTP server error: {}", e)))?;

        Ok(())
    }
}

// ============ Request/Response Types ============

/// Registration request, one broker record
#[derive(Debug, Deserialize, Serialize)]
pub struct RegisterRequest {
    #[serde(alias = "uniqueId")]
    pub unique_id: u32,
    #[serde(alias = "instanceId", alias = "ec2InstanceID")]
    pub instance_id: String,
    #[serde(alias = "ipAddress")]
    pub ip_address: String,
    pub port: u16,
}

/// Registration response
#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub registered: bool,
    pub unique_id: u32,
}

/// Failure report body
#[derive(Debug, Deserialize, Serialize)]
pub struct LeaderNotRespondingRequest {
    #[serde(alias = "currleadBrokerIPAtNode")]
    pub reported_leader_ip: String,
}

/// Failure report response
#[derive(Debug, Serialize)]
pub struct FailoverResponse {
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_leader_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notified_peers: Option<usize>,
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub brokers: usize,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

fn cloud_error_response(e: Error) -> axum::response::Response {
    (
        StatusCode::BAD_GATEWAY,
        Json(ErrorResponse {
            error: e.to_string(),
            code: "CLOUD_PROVIDER_ERROR".to_string(),
        }),
    )
        .into_response()
}

// ============ Handlers ============

async fn handle_register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> impl IntoResponse {
    let node = BrokerNode::new(req.unique_id, req.instance_id, req.ip_address, req.port);
    match state.coordinator.register(node).await {
        Ok(()) => Json(RegisterResponse {
            registered: true,
            unique_id: req.unique_id,
        })
        .into_response(),
        Err(e) => cloud_error_response(e),
    }
}

async fn handle_deregister(
    State(state): State<Arc<AppState>>,
    Path(unique_id): Path<u32>,
) -> impl IntoResponse {
    match state.coordinator.deregister(unique_id).await {
        Ok(Some(node)) => Json(node).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("Broker {} not found", unique_id),
                code: "BROKER_NOT_FOUND".to_string(),
            }),
        )
            .into_response(),
        Err(e) => cloud_error_response(e),
    }
}

async fn handle_registry(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.coordinator.registry_snapshot().await)
}

async fn handle_elastic_ip(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.coordinator.elastic_ip().await)
}

async fn handle_leader_private_ip(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.coordinator.leader_private_ip().await)
}

async fn handle_peer_ip_list(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.coordinator.peer_addresses().await)
}

async fn handle_leader_not_responding(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LeaderNotRespondingRequest>,
) -> impl IntoResponse {
    match state
        .coordinator
        .handle_leader_failure_report(&req.reported_leader_ip)
        .await
    {
        Ok(outcome) => Json(failover_response(outcome)).into_response(),
        Err(e) => cloud_error_response(e),
    }
}

async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        healthy: true,
        brokers: state.coordinator.broker_count().await,
    })
}

fn failover_response(outcome: FailoverOutcome) -> FailoverResponse {
    match outcome {
        FailoverOutcome::StaleReport => FailoverResponse {
            outcome: "stale-report",
            new_leader_ip: None,
            notified_peers: None,
        },
        FailoverOutcome::LeaderAlive => FailoverResponse {
            outcome: "leader-alive",
            new_leader_ip: None,
            notified_peers: None,
        },
        FailoverOutcome::UnresolvedLeader => FailoverResponse {
            outcome: "unresolved-leader",
            new_leader_ip: None,
            notified_peers: None,
        },
        FailoverOutcome::FailedOver {
            new_leader_ip,
            notified_peers,
        } => FailoverResponse {
            outcome: "failed-over",
            new_leader_ip,
            notified_peers: Some(notified_peers),
        },
    }
}
