// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use super::mock_backend::{connected_controller, fast_policy, MockBackend, ScriptedWallet, VerifyReply};
use std::iter::repeat;
use x402_job_client::jobs::JobParams;
use x402_job_client::{ClientError, HandshakeState, VerificationStatus};

#[tokio::test]
async fn test_verified_on_tenth_attempt() {
    let mock = MockBackend::new();
    mock.script_verify(repeat(VerifyReply::NotFound).take(9));
    let (mut controller, _wallet) =
        connected_controller(&mock, ScriptedWallet::confirming(), fast_policy()).await;

    controller
        .request_job("ping", JobParams::new())
        .await
        .expect("Expected challenge");
    controller.pay().await.expect("Payment should be verified");

    assert_eq!(controller.state(), &HandshakeState::Executing);
    assert_eq!(mock.verify_calls(), 10);
    assert!(controller.challenge().is_none());
}

#[tokio::test]
async fn test_verification_gives_up_after_eleven_attempts() {
    let mock = MockBackend::new();
    mock.with(|inner| inner.verify_default = VerifyReply::NotFound);
    let (mut controller, _wallet) =
        connected_controller(&mock, ScriptedWallet::confirming(), fast_policy()).await;

    controller
        .request_job("ping", JobParams::new())
        .await
        .expect("Expected challenge");

    let expected = ClientError::VerificationTimeout { attempts: 11 };
    assert_eq!(controller.pay().await, Err(expected.clone()));
    assert_eq!(controller.state(), &HandshakeState::Failed(expected));
    assert_eq!(mock.verify_calls(), 11);
    assert_eq!(mock.execute_calls(), 0);
}

#[tokio::test]
async fn test_retry_bound_is_configurable() {
    let mock = MockBackend::new();
    mock.with(|inner| inner.verify_default = VerifyReply::NotFound);
    let mut policy = fast_policy();
    policy.verify_max_retries = 2;
    let (mut controller, _wallet) =
        connected_controller(&mock, ScriptedWallet::confirming(), policy).await;

    controller
        .request_job("ping", JobParams::new())
        .await
        .expect("Expected challenge");

    assert_eq!(
        controller.pay().await,
        Err(ClientError::VerificationTimeout { attempts: 3 })
    );
    assert_eq!(mock.verify_calls(), 3);
}

#[tokio::test]
async fn test_server_errors_are_retried() {
    let mock = MockBackend::new();
    mock.script_verify([
        VerifyReply::ServerError,
        VerifyReply::NotFound,
        VerifyReply::ServerError,
    ]);
    let (mut controller, _wallet) =
        connected_controller(&mock, ScriptedWallet::confirming(), fast_policy()).await;

    controller
        .request_job("ping", JobParams::new())
        .await
        .expect("Expected challenge");
    controller.pay().await.expect("Payment should be verified");

    assert_eq!(controller.state(), &HandshakeState::Executing);
    assert_eq!(mock.verify_calls(), 4);
}

#[tokio::test]
async fn test_backend_expiry_during_verification() {
    let mock = MockBackend::new();
    mock.script_verify([VerifyReply::NotFound, VerifyReply::Expired]);
    let (mut controller, _wallet) =
        connected_controller(&mock, ScriptedWallet::confirming(), fast_policy()).await;

    let challenge = controller
        .request_job("ping", JobParams::new())
        .await
        .expect("Expected challenge");

    assert_eq!(
        controller.pay().await,
        Err(ClientError::ChallengeExpired {
            job_id: challenge.job_id
        })
    );
    assert_eq!(controller.state(), &HandshakeState::Expired);
    assert_eq!(mock.verify_calls(), 2);
}

#[tokio::test]
async fn test_repeat_verification_is_idempotent() {
    let mock = MockBackend::new();
    let (mut controller, _wallet) =
        connected_controller(&mock, ScriptedWallet::confirming(), fast_policy()).await;

    controller
        .run("ping", JobParams::new(), |_| {})
        .await
        .expect("Handshake should complete");

    let again = controller.reverify().await.expect("Reverify failed");
    assert_eq!(again.status, VerificationStatus::AlreadyPaid);
    let once_more = controller.reverify().await.expect("Reverify failed");
    assert_eq!(once_more.status, VerificationStatus::AlreadyPaid);

    // Neither repeat advances the handshake or runs the job again
    assert_eq!(controller.state(), &HandshakeState::Completed);
    assert_eq!(mock.execute_calls(), 1);
    assert!(matches!(
        controller.execute().await,
        Err(ClientError::InvalidState { .. })
    ));
    assert_eq!(mock.execute_calls(), 1);
}

#[tokio::test]
async fn test_reverify_requires_a_paid_job() {
    let mock = MockBackend::new();
    let (mut controller, _wallet) =
        connected_controller(&mock, ScriptedWallet::confirming(), fast_policy()).await;

    controller
        .request_job("ping", JobParams::new())
        .await
        .expect("Expected challenge");

    assert!(matches!(
        controller.reverify().await,
        Err(ClientError::InvalidState { operation: "reverify", .. })
    ));
    assert_eq!(mock.verify_calls(), 0);
}
