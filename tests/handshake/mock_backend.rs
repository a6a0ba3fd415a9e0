// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use ethers::types::{
    Address, Bytes, TransactionReceipt, TransactionRequest, H256, U64,
};
use serde_json::{json, Value};
use std::collections::{HashSet, VecDeque};
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use x402_job_client::config::ChainConfig;
use x402_job_client::wallet::{self, WalletProvider};
use x402_job_client::{ClientError, HandshakeController, HandshakePolicy, JobApiClient, Session};

pub const TOKEN_ADDRESS: &str = "0x7143401013282067926d25e316f055fF3bc6c3FD";
pub const RECIPIENT_ADDRESS: &str = "0x6b27b7af171b6042238f1034ef1815037ab9bfa5";
pub const PING_PRICE: &str = "0.01";

/// How the backend answers one verification request
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VerifyReply {
    NotFound,
    /// `verified` the first time a (job, tx) pair is seen, `already_paid` after
    Paid,
    Expired,
    ServerError,
}

pub struct MockInner {
    pub verify_script: VecDeque<VerifyReply>,
    pub verify_default: VerifyReply,
    pub verify_calls: u32,
    pub execute_calls: u32,
    pub job_requests: Vec<Value>,
    pub authorizations: Vec<Value>,
    pub challenge_ttl: chrono::Duration,
    pub sse_events: Vec<(String, String)>,
    /// `/api/jobs` answers 503 while set
    pub catalog_unavailable: bool,
    /// Overrides the amount quoted in 402 challenges
    pub challenge_amount: Option<String>,
    paid: HashSet<(String, String)>,
}

/// In-process x402 job backend
#[derive(Clone)]
pub struct MockBackend {
    inner: Arc<Mutex<MockInner>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockInner {
                verify_script: VecDeque::new(),
                verify_default: VerifyReply::Paid,
                verify_calls: 0,
                execute_calls: 0,
                job_requests: Vec::new(),
                authorizations: Vec::new(),
                challenge_ttl: chrono::Duration::seconds(300),
                sse_events: vec![
                    ("start".to_string(), "Job started".to_string()),
                    ("output".to_string(), "a".to_string()),
                    ("output".to_string(), "b".to_string()),
                    ("complete".to_string(), "Job completed".to_string()),
                ],
                catalog_unavailable: false,
                challenge_amount: None,
                paid: HashSet::new(),
            })),
        }
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut MockInner) -> R) -> R {
        let mut inner = self.inner.lock().expect("Mock state poisoned");
        f(&mut inner)
    }

    pub fn script_verify(&self, replies: impl IntoIterator<Item = VerifyReply>) {
        self.with(|inner| inner.verify_script.extend(replies));
    }

    pub fn set_events(&self, events: &[(&str, &str)]) {
        self.with(|inner| {
            inner.sse_events = events
                .iter()
                .map(|(event, data)| (event.to_string(), data.to_string()))
                .collect()
        });
    }

    pub fn verify_calls(&self) -> u32 {
        self.with(|inner| inner.verify_calls)
    }

    pub fn execute_calls(&self) -> u32 {
        self.with(|inner| inner.execute_calls)
    }

    /// Serves the backend on an ephemeral port and returns its base URL
    pub async fn spawn(&self) -> String {
        let app = Router::new()
            .route("/", get(health))
            .route("/api/jobs", get(list_jobs))
            .route("/api/jobs/request", post(request_job))
            .route("/api/jobs/verify-payment", post(verify_payment))
            .route("/api/jobs/execute/:job_id", get(execute_job))
            .route("/api/jobs/status/:job_id", get(job_status))
            .with_state(self.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock backend");
        let addr = listener.local_addr().expect("Failed to read local addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("Mock backend stopped");
        });

        format!("http://{}", addr)
    }
}

async fn health() -> Json<Value> {
    Json(json!({
        "service": "x402 Job Backend",
        "status": "running",
        "network": "base-sepolia",
        "connected": true
    }))
}

async fn list_jobs(State(mock): State<MockBackend>) -> Response {
    if mock.with(|inner| inner.catalog_unavailable) {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    Json(json!({
        "jobs": {
            "ping": {"name": "ping", "price": PING_PRICE},
            "dns_lookup": {"name": "dns lookup", "price": 0.005}
        },
        "token_address": TOKEN_ADDRESS,
        "recipient_address": RECIPIENT_ADDRESS
    }))
    .into_response()
}

async fn request_job(
    State(mock): State<MockBackend>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let job_type = body["job_type"].as_str().unwrap_or_default().to_string();
    let price = match job_type.as_str() {
        "ping" => PING_PRICE,
        "dns_lookup" => "0.005",
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"detail": format!("Invalid job type: {}", job_type)})),
            )
                .into_response()
        }
    };

    if let Some(header) = headers.get("X-PAYMENT") {
        let authorization: Value =
            serde_json::from_slice(header.as_bytes()).expect("X-PAYMENT is not JSON");
        let job_id = body["job_id"].as_str().unwrap_or_default().to_string();
        mock.with(|inner| {
            inner.job_requests.push(body.clone());
            inner.authorizations.push(authorization);
        });
        return Json(json!({"status": "authorized", "job_id": job_id})).into_response();
    }

    let (ttl, amount) = mock.with(|inner| {
        inner.job_requests.push(body.clone());
        (
            inner.challenge_ttl,
            inner
                .challenge_amount
                .clone()
                .unwrap_or_else(|| price.to_string()),
        )
    });
    let job_id = uuid::Uuid::new_v4().to_string();
    (
        StatusCode::PAYMENT_REQUIRED,
        Json(json!({
            "job_id": job_id,
            "payment": {
                "amount": amount,
                "token_address": TOKEN_ADDRESS,
                "recipient_address": RECIPIENT_ADDRESS,
                "chain_id": 84532,
                "network": "base-sepolia"
            },
            "expires_at": (Utc::now() + ttl).to_rfc3339(),
            "timeout_seconds": ttl.num_seconds().max(0),
            "message": "Payment required to execute this job"
        })),
    )
        .into_response()
}

async fn verify_payment(State(mock): State<MockBackend>, Json(body): Json<Value>) -> Response {
    let job_id = body["job_id"].as_str().unwrap_or_default().to_string();
    let tx_hash = body["tx_hash"].as_str().unwrap_or_default().to_string();

    let (reply, seen_before) = mock.with(|inner| {
        inner.verify_calls += 1;
        let reply = inner
            .verify_script
            .pop_front()
            .unwrap_or(inner.verify_default);
        let key = (job_id.clone(), tx_hash.clone());
        let seen_before = reply == VerifyReply::Paid && !inner.paid.insert(key);
        (reply, seen_before)
    });

    match reply {
        VerifyReply::NotFound => (
            StatusCode::PAYMENT_REQUIRED,
            Json(json!({"status": "payment_not_found", "message": "Payment not detected yet"})),
        )
            .into_response(),
        VerifyReply::Paid if seen_before => Json(json!({
            "status": "already_paid",
            "message": "Job already paid",
            "execution_url": format!("/api/jobs/execute/{}", job_id)
        }))
        .into_response(),
        VerifyReply::Paid => Json(json!({
            "status": "verified",
            "message": "Payment verified",
            "tx_hash": tx_hash,
            "execution_url": format!("/api/jobs/execute/{}", job_id)
        }))
        .into_response(),
        VerifyReply::Expired => (
            StatusCode::REQUEST_TIMEOUT,
            Json(json!({"detail": "Payment window expired"})),
        )
            .into_response(),
        VerifyReply::ServerError => {
            (StatusCode::INTERNAL_SERVER_ERROR, "RPC unavailable").into_response()
        }
    }
}

async fn execute_job(State(mock): State<MockBackend>, Path(job_id): Path<String>) -> Response {
    if job_id == "missing" {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"detail": "Job not found"})),
        )
            .into_response();
    }

    let events = mock.with(|inner| {
        inner.execute_calls += 1;
        inner.sse_events.clone()
    });
    let stream = futures::stream::iter(
        events
            .into_iter()
            .map(|(event, data)| Ok::<_, Infallible>(Event::default().event(event).data(data))),
    );
    Sse::new(stream).into_response()
}

async fn job_status(Path(job_id): Path<String>) -> Response {
    if job_id == "missing" {
        return Json(json!({"status": "not_found"})).into_response();
    }
    Json(json!({
        "status": "paid",
        "paid": true,
        "expires_at": Utc::now().to_rfc3339(),
        "price": PING_PRICE
    }))
    .into_response()
}

/// How the scripted wallet's transfer ends up on chain
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReceiptScript {
    /// Pending for `pending_polls` lookups, then mined with `status`
    Mined { pending_polls: u32, status: u64 },
    NeverMined,
    /// Every lookup fails at the RPC layer
    LookupError,
}

/// Wallet double that records transfers and replays scripted receipts
pub struct ScriptedWallet {
    pub address: Address,
    receipt: ReceiptScript,
    send_delay: Duration,
    reject_send: bool,
    sent: Mutex<Vec<TransactionRequest>>,
    lookups: Mutex<u32>,
    chains: Mutex<HashSet<u64>>,
}

impl ScriptedWallet {
    pub fn new(receipt: ReceiptScript) -> Self {
        Self {
            address: "0x00000000000000000000000000000000000000aa"
                .parse()
                .expect("Invalid test address"),
            receipt,
            send_delay: Duration::ZERO,
            reject_send: false,
            sent: Mutex::new(Vec::new()),
            lookups: Mutex::new(0),
            chains: Mutex::new(HashSet::new()),
        }
    }

    pub fn confirming() -> Self {
        Self::new(ReceiptScript::Mined {
            pending_polls: 1,
            status: 1,
        })
    }

    pub fn with_send_delay(mut self, delay: Duration) -> Self {
        self.send_delay = delay;
        self
    }

    /// Rejects every transfer, as a user declining in the wallet would
    pub fn rejecting() -> Self {
        Self {
            reject_send: true,
            ..Self::confirming()
        }
    }

    pub fn sent(&self) -> Vec<TransactionRequest> {
        self.sent.lock().expect("Wallet state poisoned").clone()
    }

    pub fn tx_hash() -> H256 {
        H256::from_low_u64_be(0x402)
    }
}

#[async_trait]
impl WalletProvider for ScriptedWallet {
    async fn request_accounts(&self) -> x402_job_client::Result<Vec<Address>> {
        Ok(vec![self.address])
    }

    async fn chain_id(&self) -> x402_job_client::Result<u64> {
        Ok(84532)
    }

    async fn switch_chain(&self, chain: &ChainConfig) -> x402_job_client::Result<()> {
        if self.chains.lock().expect("Wallet state poisoned").contains(&chain.chain_id) {
            Ok(())
        } else {
            Err(ClientError::UnrecognizedChain {
                chain_id: chain.chain_id,
            })
        }
    }

    async fn add_chain(&self, chain: &ChainConfig) -> x402_job_client::Result<()> {
        self.chains
            .lock()
            .expect("Wallet state poisoned")
            .insert(chain.chain_id);
        Ok(())
    }

    async fn send_transaction(&self, tx: TransactionRequest) -> x402_job_client::Result<H256> {
        if !self.send_delay.is_zero() {
            tokio::time::sleep(self.send_delay).await;
        }
        if self.reject_send {
            return Err(ClientError::Wallet("user rejected transaction".to_string()));
        }
        self.sent.lock().expect("Wallet state poisoned").push(tx);
        Ok(Self::tx_hash())
    }

    async fn transaction_receipt(
        &self,
        tx_hash: H256,
    ) -> x402_job_client::Result<Option<TransactionReceipt>> {
        let mut lookups = self.lookups.lock().expect("Wallet state poisoned");
        *lookups += 1;

        match self.receipt {
            ReceiptScript::NeverMined => Ok(None),
            ReceiptScript::LookupError => {
                Err(ClientError::Wallet("eth_getTransactionReceipt failed".to_string()))
            }
            ReceiptScript::Mined { pending_polls, .. } if *lookups <= pending_polls => Ok(None),
            ReceiptScript::Mined { status, .. } => Ok(Some(TransactionReceipt {
                transaction_hash: tx_hash,
                block_number: Some(U64::from(42)),
                status: Some(U64::from(status)),
                ..Default::default()
            })),
        }
    }

    async fn call(&self, _tx: TransactionRequest) -> x402_job_client::Result<Bytes> {
        // 12.5 tokens
        let amount = ethers::types::U256::from(12_500_000_000_000_000_000u128);
        Ok(Bytes::from(ethers::abi::encode(&[ethers::abi::Token::Uint(amount)])))
    }
}

/// Millisecond-scale polling so scripted flows finish quickly
pub fn fast_policy() -> HandshakePolicy {
    HandshakePolicy {
        receipt_poll_interval: Duration::from_millis(10),
        confirmation_timeout: Duration::from_secs(5),
        verify_max_retries: 10,
        verify_retry_delay: Duration::from_millis(5),
    }
}

pub type TestController = HandshakeController<JobApiClient, ScriptedWallet>;

/// Controller wired to a fresh mock backend, with the wallet connected and the catalog loaded
pub async fn connected_controller(
    mock: &MockBackend,
    wallet: ScriptedWallet,
    policy: HandshakePolicy,
) -> (TestController, Arc<ScriptedWallet>) {
    let url = mock.spawn().await;
    let backend = Arc::new(JobApiClient::new(&url).expect("Failed to create client"));
    let wallet = Arc::new(wallet);

    let address = wallet::connect(wallet.as_ref(), &ChainConfig::base_sepolia())
        .await
        .expect("Failed to connect wallet");
    let mut controller =
        HandshakeController::new(backend, Arc::clone(&wallet), Session::new(address), policy);
    controller.load_jobs().await.expect("Failed to load jobs");

    (controller, wallet)
}
