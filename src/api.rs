//! REST API for the TrinityChain light client
//!
//! Exposes transaction creation, sign-and-send and Merkle inclusion checks.
//! Every core route answers with [`JsonResponse`]: a status code, a message
//! and an optional list of named string fields.
//!
//! The key-generating contract route puts private key bytes in its response.
//! It is refused unless `api.allow_key_generation` is set.

use axum::{
    extract::{Path, Request, State},
    http::{self, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::config::Config;
use crate::crypto::{short_hex, Sha256Hash};
use crate::dispatcher::Dispatcher;
use crate::error::ClientError;
use crate::merkle::{self, MerkleProof, MerkleStep};
use crate::network::{Broadcaster, PeerClient, ProofSource};
use crate::registry::PendingRegistry;
use crate::transaction::factory::parse_hex;
use crate::transaction::{TxFactory, TxKind, TxRequest};

/// Shared state behind every route
#[derive(Clone)]
pub struct ClientNode {
    pub registry: Arc<PendingRegistry>,
    pub factory: TxFactory,
    pub dispatcher: Dispatcher,
    proofs: Arc<dyn ProofSource>,
    proof_endpoint: String,
    api_stats: Arc<RwLock<ApiStats>>,
}

/// API statistics and monitoring
#[derive(Debug, Default)]
struct ApiStats {
    total_requests: u64,
    successful_requests: u64,
    failed_requests: u64,
    transactions_created: u64,
    transactions_sent: u64,
    proofs_checked: u64,
    start_time: Option<Instant>,
}

impl ApiStats {
    fn new() -> Self {
        ApiStats {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    fn record_request(&mut self, success: bool) {
        self.total_requests += 1;
        if success {
            self.successful_requests += 1;
        } else {
            self.failed_requests += 1;
        }
    }
}

impl ClientNode {
    /// Wires a node against the bootstrap peer named in `config`.
    pub fn from_config(config: &Config) -> Self {
        let peer = Arc::new(PeerClient::new(config.network.timeout()));
        Self::new(config, peer.clone(), peer)
    }

    /// Wires a node with explicit network collaborators.
    pub fn new(
        config: &Config,
        broadcaster: Arc<dyn Broadcaster>,
        proofs: Arc<dyn ProofSource>,
    ) -> Self {
        let registry = Arc::new(PendingRegistry::new());
        let factory = TxFactory::new(registry.clone(), config.api.allow_key_generation);
        let dispatcher = Dispatcher::new(
            registry.clone(),
            broadcaster,
            config.network.bootstrap_peer.clone(),
            config.dispatch.eviction,
        );

        Self {
            registry,
            factory,
            dispatcher,
            proofs,
            proof_endpoint: config.network.bootstrap_peer.clone(),
            api_stats: Arc::new(RwLock::new(ApiStats::new())),
        }
    }

    pub async fn get_stats(&self) -> ApiStatsResponse {
        let stats = self.api_stats.read().await;
        let uptime = stats.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0);

        ApiStatsResponse {
            total_requests: stats.total_requests,
            successful_requests: stats.successful_requests,
            failed_requests: stats.failed_requests,
            transactions_created: stats.transactions_created,
            transactions_sent: stats.transactions_sent,
            proofs_checked: stats.proofs_checked,
            uptime_seconds: uptime,
        }
    }
}

// ============================================================================
// Response Shape
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    pub name: String,
    pub detail: String,
}

impl Content {
    fn new(name: &str, detail: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonResponse {
    pub code: u16,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<Content>,
}

impl JsonResponse {
    fn ok(message: impl Into<String>, content: Vec<Content>) -> Self {
        Self {
            code: StatusCode::OK.as_u16(),
            message: message.into(),
            content,
        }
    }
}

impl IntoResponse for JsonResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

// ============================================================================
// API Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    ClientError(ClientError),
    InvalidInput(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::ClientError(e) => {
                let status = match &e {
                    ClientError::MalformedInput(_) => StatusCode::BAD_REQUEST,
                    ClientError::KeyGenerationDisabled => StatusCode::FORBIDDEN,
                    ClientError::NotFound(_) => StatusCode::NOT_FOUND,
                    ClientError::NetworkError { .. } => StatusCode::BAD_GATEWAY,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, e.to_string())
            }
            ApiError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
        };

        JsonResponse {
            code: status.as_u16(),
            message,
            content: Vec::new(),
        }
        .into_response()
    }
}

impl From<ClientError> for ApiError {
    fn from(err: ClientError) -> Self {
        ApiError::ClientError(err)
    }
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Serialize)]
pub struct ApiStatsResponse {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub transactions_created: u64,
    pub transactions_sent: u64,
    pub proofs_checked: u64,
    pub uptime_seconds: u64,
}

#[derive(Debug, Deserialize)]
pub struct PathStepRequest {
    pub sibling: String,
    pub parent: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub tx_hash: String,
    pub block_hash: String,
    /// Hash the caller recomputed from the transaction body. Defaults to
    /// `tx_hash`, in which case only the path itself is checked.
    #[serde(default)]
    pub recomputed_hash: Option<String>,
    /// Sibling path; fetched from the bootstrap peer when absent.
    #[serde(default)]
    pub path: Option<Vec<PathStepRequest>>,
}

// ============================================================================
// Utility Functions
// ============================================================================

fn parse_kind(kind: &str) -> Result<TxKind, ApiError> {
    match kind {
        "contract" => Ok(TxKind::Contract),
        "config" => Ok(TxKind::Config),
        "funds" => Ok(TxKind::Funds),
        other => Err(ApiError::InvalidInput(format!(
            "Unknown transaction kind: {}",
            other
        ))),
    }
}

fn parse_hash(field: &str, value: &str) -> Result<Sha256Hash, ApiError> {
    Ok(parse_hex::<32>(field, value)?)
}

// ============================================================================
// Middleware
// ============================================================================

async fn stats_middleware(
    State(node): State<Arc<ClientNode>>,
    req: Request,
    next: Next,
) -> Response {
    let response = next.run(req).await;

    let success = response.status().is_success();
    let mut stats = node.api_stats.write().await;
    stats.record_request(success);

    response
}

/// Logs method, path, status and duration of each request.
async fn logging_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;

    tracing::info!(
        method = %method,
        path = %path,
        status = %response.status().as_u16(),
        duration_ms = %start.elapsed().as_millis(),
        "api.request"
    );

    response
}

// ============================================================================
// API Server
// ============================================================================

/// Build the API router with all endpoints
pub fn build_api_router(node: Arc<ClientNode>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods(vec![
            http::Method::GET,
            http::Method::POST,
            http::Method::OPTIONS,
        ])
        .allow_headers(vec![http::header::CONTENT_TYPE])
        .allow_credentials(true);

    let api_routes = Router::new()
        // Creation endpoints
        .route(
            "/create/contract/:header/:fee/:issuer",
            post(create_contract_tx),
        )
        .route(
            "/create/contract/:header/:fee/:issuer/:pub_key",
            post(create_contract_tx_with_key),
        )
        .route(
            "/create/config/:header/:id/:payload/:fee/:tx_cnt",
            post(create_config_tx),
        )
        .route(
            "/create/funds/:header/:amount/:fee/:tx_cnt/:from/:to",
            post(create_funds_tx),
        )
        // Dispatch
        .route("/send/:kind/:tx_hash/:signature", post(send_tx))
        // Inclusion proofs
        .route("/verify", post(verify_tx))
        // System endpoints
        .route("/pending", get(get_pending))
        .route("/health", get(health_check))
        .route("/stats", get(get_api_stats))
        .layer(middleware::from_fn(logging_middleware))
        .layer(middleware::from_fn_with_state(
            node.clone(),
            stats_middleware,
        ))
        .with_state(node);

    Router::new().nest("/api", api_routes).layer(cors)
}

/// Serve the API on `0.0.0.0:port` until the process stops.
pub async fn run_api_server(
    node: Arc<ClientNode>,
    port: u16,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = build_api_router(node);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!(%addr, "API server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

// ============================================================================
// Route Handlers
// ============================================================================

async fn stage(node: &ClientNode, request: TxRequest) -> Result<JsonResponse, ApiError> {
    let created = node.factory.create(&request)?;
    {
        let mut stats = node.api_stats.write().await;
        stats.transactions_created += 1;
    }

    let mut content = Vec::new();
    if let Some(keypair) = &created.generated_key {
        let public_key = keypair.public_key_xy();
        content.push(Content::new("PubKey1", hex::encode(&public_key[..32])));
        content.push(Content::new("PubKey2", hex::encode(&public_key[32..])));
        content.push(Content::new("PrivKey", hex::encode(keypair.secret_bytes())));
    }
    content.push(Content::new("TxHash", hex::encode(created.hash)));

    let message = match created.tx.kind() {
        TxKind::Contract => "ContractTx successfully created.",
        TxKind::Config => "ConfigTx successfully created.",
        TxKind::Funds => "FundsTx successfully created.",
    };
    Ok(JsonResponse::ok(message, content))
}

async fn create_contract_tx(
    State(node): State<Arc<ClientNode>>,
    Path((header, fee, issuer)): Path<(String, String, String)>,
) -> Result<JsonResponse, ApiError> {
    let request = TxRequest::Contract {
        header,
        fee,
        issuer,
        public_key: None,
    };
    stage(&node, request).await
}

async fn create_contract_tx_with_key(
    State(node): State<Arc<ClientNode>>,
    Path((header, fee, issuer, pub_key)): Path<(String, String, String, String)>,
) -> Result<JsonResponse, ApiError> {
    let request = TxRequest::Contract {
        header,
        fee,
        issuer,
        public_key: Some(pub_key),
    };
    stage(&node, request).await
}

async fn create_config_tx(
    State(node): State<Arc<ClientNode>>,
    Path((header, id, payload, fee, tx_cnt)): Path<(String, String, String, String, String)>,
) -> Result<JsonResponse, ApiError> {
    let request = TxRequest::Config {
        header,
        id,
        payload,
        fee,
        tx_cnt,
    };
    stage(&node, request).await
}

async fn create_funds_tx(
    State(node): State<Arc<ClientNode>>,
    Path((header, amount, fee, tx_cnt, from, to)): Path<(
        String,
        String,
        String,
        String,
        String,
        String,
    )>,
) -> Result<JsonResponse, ApiError> {
    let request = TxRequest::Funds {
        header,
        amount,
        fee,
        tx_cnt,
        from,
        to,
    };
    stage(&node, request).await
}

async fn send_tx(
    State(node): State<Arc<ClientNode>>,
    Path((kind, tx_hash, signature)): Path<(String, String, String)>,
) -> Result<JsonResponse, ApiError> {
    let kind = parse_kind(&kind)?;
    let hash = parse_hash("txHash", &tx_hash)?;
    let signature = parse_hex::<64>("txSign", &signature)?;

    tracing::info!(kind = %kind, tx_hash = %short_hex(&hash), "incoming send request");

    let receipt = node.dispatcher.dispatch(kind, &hash, signature).await?;
    {
        let mut stats = node.api_stats.write().await;
        stats.transactions_sent += 1;
    }

    Ok(JsonResponse::ok(
        receipt.message(),
        vec![Content::new("TxHash", hex::encode(receipt.hash))],
    ))
}

async fn verify_tx(
    State(node): State<Arc<ClientNode>>,
    Json(req): Json<VerifyRequest>,
) -> Result<JsonResponse, ApiError> {
    let tx_hash = parse_hash("tx_hash", &req.tx_hash)?;
    let block_hash = parse_hash("block_hash", &req.block_hash)?;
    let recomputed = match &req.recomputed_hash {
        Some(h) => parse_hash("recomputed_hash", h)?,
        None => tx_hash,
    };

    let valid = match &req.path {
        Some(steps) => {
            let steps = steps
                .iter()
                .map(|s| {
                    Ok(MerkleStep::new(
                        parse_hash("sibling", &s.sibling)?,
                        parse_hash("parent", &s.parent)?,
                    ))
                })
                .collect::<Result<Vec<_>, ApiError>>()?;
            merkle::verify(&tx_hash, &recomputed, &MerkleProof::new(steps))
        }
        None => {
            merkle::verify_inclusion(
                node.proofs.as_ref(),
                &node.proof_endpoint,
                &block_hash,
                &tx_hash,
                &recomputed,
            )
            .await?
        }
    };
    {
        let mut stats = node.api_stats.write().await;
        stats.proofs_checked += 1;
    }

    let message = if valid {
        format!(
            "Transaction {} is included in block {}.",
            short_hex(&tx_hash),
            short_hex(&block_hash)
        )
    } else {
        format!(
            "Tx validation failed for {} in block {}.",
            short_hex(&tx_hash),
            short_hex(&block_hash)
        )
    };
    Ok(JsonResponse::ok(
        message,
        vec![Content::new("Valid", valid.to_string())],
    ))
}

async fn get_pending(State(node): State<Arc<ClientNode>>) -> JsonResponse {
    let content = TxKind::ALL
        .iter()
        .map(|kind| Content::new(kind.as_str(), node.registry.len(*kind).to_string()))
        .collect();
    JsonResponse::ok("Pending transactions awaiting signature.", content)
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn get_api_stats(State(node): State<Arc<ClientNode>>) -> impl IntoResponse {
    Json(node.get_stats().await)
}
