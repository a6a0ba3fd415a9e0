// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use super::mock_backend::{
    connected_controller, fast_policy, MockBackend, ScriptedWallet, PING_PRICE, RECIPIENT_ADDRESS,
    TOKEN_ADDRESS,
};
use ethers::types::Address;
use serde_json::json;
use x402_job_client::jobs::{self, JobParams, JobState, JobRequest};
use x402_job_client::{ClientError, HandshakeState, JobApiClient, JobBackend};

fn wallet_address() -> Address {
    "0x00000000000000000000000000000000000000aa".parse().unwrap()
}

#[tokio::test]
async fn test_catalog_lists_jobs_and_payment_addresses() {
    let mock = MockBackend::new();
    let client = JobApiClient::new(&mock.spawn().await).expect("Failed to create client");

    let catalog = jobs::load_jobs(&client).await.expect("Failed to load jobs");

    assert_eq!(catalog.len(), 2);
    assert_eq!(catalog.get("ping").unwrap().price, PING_PRICE);
    // Numeric prices are normalized to decimal strings
    assert_eq!(catalog.get("dns_lookup").unwrap().price, "0.005");
    assert_eq!(catalog.token_address, TOKEN_ADDRESS.parse::<Address>().unwrap());
    assert_eq!(
        catalog.recipient_address,
        RECIPIENT_ADDRESS.parse::<Address>().unwrap()
    );
}

#[tokio::test]
async fn test_selected_job_type_is_sent_verbatim() {
    let mock = MockBackend::new();
    let client = JobApiClient::new(&mock.spawn().await).expect("Failed to create client");
    let catalog = jobs::load_jobs(&client).await.expect("Failed to load jobs");

    for job in catalog.iter() {
        let request = catalog
            .select(&job.key, JobParams::new(), wallet_address())
            .expect("Listed job should be selectable");
        client
            .request_job(&request)
            .await
            .expect("Failed to request job");
    }

    let sent: Vec<String> = mock.with(|inner| {
        inner
            .job_requests
            .iter()
            .map(|body| body["job_type"].as_str().unwrap().to_string())
            .collect()
    });
    assert_eq!(sent, vec!["dns_lookup".to_string(), "ping".to_string()]);
}

#[tokio::test]
async fn test_challenge_is_parsed_from_402() {
    let mock = MockBackend::new();
    let client = JobApiClient::new(&mock.spawn().await).expect("Failed to create client");

    let mut params = JobParams::new();
    params.insert("host".to_string(), json!("google.com"));
    let request = JobRequest {
        job_type: "ping".to_string(),
        params,
        wallet_address: wallet_address(),
        job_id: None,
    };

    let challenge = client.request_job(&request).await.expect("Expected challenge");
    assert_eq!(challenge.payment.amount, PING_PRICE);
    assert_eq!(challenge.payment.chain_id, Some(84532));
    assert_eq!(challenge.timeout_seconds, Some(300));
    assert!(!challenge.is_expired_at(chrono::Utc::now()));

    let body = mock.with(|inner| inner.job_requests[0].clone());
    assert_eq!(body["params"]["host"], "google.com");
    assert!(body.get("job_id").is_none());
}

#[tokio::test]
async fn test_rejected_job_type_is_protocol_violation() {
    let mock = MockBackend::new();
    let client = JobApiClient::new(&mock.spawn().await).expect("Failed to create client");

    let request = JobRequest {
        job_type: "traceroute".to_string(),
        params: JobParams::new(),
        wallet_address: wallet_address(),
        job_id: None,
    };

    match client.request_job(&request).await {
        Err(ClientError::ProtocolViolation(msg)) => assert!(msg.contains("400")),
        other => panic!("Expected ProtocolViolation, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unreachable_backend_is_network_error() {
    // Bind then drop to get a port nothing listens on
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = JobApiClient::new(&format!("http://{}", addr)).unwrap();
    let err = jobs::load_jobs(&client).await.unwrap_err();
    assert!(matches!(err, ClientError::Network(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_health_and_status_endpoints() {
    let mock = MockBackend::new();
    let client = JobApiClient::new(&mock.spawn().await).expect("Failed to create client");

    let health = client.health().await.expect("Failed to get health");
    assert_eq!(health.status, "running");
    assert!(health.connected);

    let status = client.job_status("some-job").await.expect("Failed to get status");
    assert_eq!(status.status, JobState::Paid);
    assert_eq!(status.paid, Some(true));
    assert_eq!(status.price.as_deref(), Some(PING_PRICE));

    let missing = client.job_status("missing").await.expect("Failed to get status");
    assert_eq!(missing.status, JobState::NotFound);
}

#[tokio::test]
async fn test_failed_reload_clears_session_catalog() {
    let mock = MockBackend::new();
    let (mut controller, _wallet) =
        connected_controller(&mock, ScriptedWallet::confirming(), fast_policy()).await;
    assert_eq!(controller.session().catalog().expect("Catalog loaded").len(), 2);

    mock.with(|inner| inner.catalog_unavailable = true);
    let err = controller.load_jobs().await.unwrap_err();
    assert!(matches!(err, ClientError::Network(_)), "got {:?}", err);

    assert!(controller.session().catalog().is_err());
    assert!(matches!(
        controller.request_job("ping", JobParams::new()).await,
        Err(ClientError::InvalidState { .. })
    ));
    assert_eq!(controller.state(), &HandshakeState::Idle);
    assert!(mock.with(|inner| inner.job_requests.is_empty()));

    // Reloading once the backend is back restores the catalog
    mock.with(|inner| inner.catalog_unavailable = false);
    controller.load_jobs().await.expect("Reload should succeed");
    controller
        .request_job("ping", JobParams::new())
        .await
        .expect("Expected challenge");
}
