// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Payment handshake controller
//!
//! Drives one job through request, on-chain payment, backend verification and
//! execution:
//!
//! ```text
//! Idle -> Requesting -> AwaitingPayment -> Submitting -> ConfirmingOnChain
//!      -> VerifyingBackend -> Executing -> Completed
//! ```
//!
//! Any step may end in `Failed`; the payment window may end in `Expired` while
//! awaiting payment or submitting. A terminal controller accepts a fresh
//! `request_job`, which resets it to `Idle` first.

use chrono::{DateTime, Utc};
use ethers::types::{TransactionReceipt, H256, U64};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::policy::HandshakePolicy;
use super::state::{HandshakeEvent, HandshakeState, Session};
use crate::api::JobBackend;
use crate::contracts::erc20::TransferCall;
use crate::error::{ClientError, Result};
use crate::execution::{self, ExecutionOutcome, ExecutionTranscript};
use crate::jobs::{
    self, JobCatalog, JobParams, OutputEvent, PaymentChallenge, PaymentConfirmation,
    VerificationResult,
};
use crate::wallet::WalletProvider;

const EVENT_CHANNEL_CAPACITY: usize = 256;

pub struct HandshakeController<B: ?Sized, W: ?Sized> {
    backend: Arc<B>,
    wallet: Arc<W>,
    session: Session,
    policy: HandshakePolicy,
    state: HandshakeState,
    challenge: Option<PaymentChallenge>,
    job_id: Option<String>,
    tx_hash: Option<H256>,
    executed: bool,
    cancel: CancellationToken,
    events: Option<mpsc::Sender<HandshakeEvent>>,
}

impl<B, W> HandshakeController<B, W>
where
    B: JobBackend + ?Sized,
    W: WalletProvider + ?Sized,
{
    pub fn new(backend: Arc<B>, wallet: Arc<W>, session: Session, policy: HandshakePolicy) -> Self {
        Self {
            backend,
            wallet,
            session,
            policy,
            state: HandshakeState::Idle,
            challenge: None,
            job_id: None,
            tx_hash: None,
            executed: false,
            cancel: CancellationToken::new(),
            events: None,
        }
    }

    /// Receiver for progress events; replaces any earlier subscriber
    pub fn subscribe(&mut self) -> mpsc::Receiver<HandshakeEvent> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        self.events = Some(tx);
        rx
    }

    pub fn state(&self) -> &HandshakeState {
        &self.state
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn policy(&self) -> &HandshakePolicy {
        &self.policy
    }

    /// Outstanding challenge, held until verification succeeds or the window expires
    pub fn challenge(&self) -> Option<&PaymentChallenge> {
        self.challenge.as_ref()
    }

    pub fn job_id(&self) -> Option<&str> {
        self.job_id.as_deref()
    }

    pub fn tx_hash(&self) -> Option<H256> {
        self.tx_hash
    }

    /// Token that aborts the in-flight attempt
    ///
    /// The token is only replaced once it has fired, so a handle stays live across
    /// finished attempts until it is used.
    pub fn cancel_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Fetches the catalog into the session; on failure the session holds no catalog
    pub async fn load_jobs(&mut self) -> Result<&JobCatalog> {
        match jobs::load_jobs(self.backend.as_ref()).await {
            Ok(catalog) => {
                self.session.set_catalog(Some(catalog));
                self.session.catalog()
            }
            Err(e) => {
                self.session.set_catalog(None);
                Err(e)
            }
        }
    }

    /// Asks the backend for a job and stores the 402 challenge it answers with
    pub async fn request_job(&mut self, job_type: &str, params: JobParams) -> Result<PaymentChallenge> {
        if self.state.is_terminal() {
            self.reset();
        }
        self.require(HandshakeState::Idle, "request_job")?;

        let request = self
            .session
            .catalog()?
            .select(job_type, params, self.session.wallet_address)?;

        if self.cancel.is_cancelled() {
            self.cancel = CancellationToken::new();
        }
        self.transition(HandshakeState::Requesting);

        let backend = Arc::clone(&self.backend);
        let cancel = self.cancel.clone();
        let response = tokio::select! {
            _ = cancel.cancelled() => None,
            response = backend.request_job(&request) => Some(response),
        };

        match response {
            None => Err(self.abort_cancelled()),
            Some(Err(e)) => Err(self.fail(e)),
            Some(Ok(challenge)) => {
                info!(
                    "💰 Payment required for job {}: {} tokens to {:?} (expires {})",
                    challenge.job_id,
                    challenge.payment.amount,
                    challenge.payment.recipient_address,
                    challenge.expires_at
                );
                self.job_id = Some(challenge.job_id.clone());
                self.challenge = Some(challenge.clone());
                self.transition(HandshakeState::AwaitingPayment);
                Ok(challenge)
            }
        }
    }

    /// True while a live challenge is waiting to be paid
    pub fn can_pay(&self) -> bool {
        self.can_pay_at(Utc::now())
    }

    pub fn can_pay_at(&self, now: DateTime<Utc>) -> bool {
        self.state == HandshakeState::AwaitingPayment
            && self
                .challenge
                .as_ref()
                .map_or(false, |challenge| !challenge.is_expired_at(now))
    }

    /// Time left on the payment window while it applies
    pub fn countdown_at(&self, now: DateTime<Utc>) -> Option<Duration> {
        if !self.state.can_expire() {
            return None;
        }
        self.challenge
            .as_ref()
            .map(|challenge| challenge.remaining_at(now))
    }

    pub fn check_expiry(&mut self) -> bool {
        self.check_expiry_at(Utc::now())
    }

    /// Moves to `Expired` if the payment window has closed; returns whether it did
    pub fn check_expiry_at(&mut self, now: DateTime<Utc>) -> bool {
        let expired = self.state.can_expire()
            && self
                .challenge
                .as_ref()
                .map_or(false, |challenge| challenge.is_expired_at(now));

        if expired {
            self.expire();
        }
        expired
    }

    /// Pays the outstanding challenge and waits until the backend acknowledges it
    ///
    /// Runs `Submitting -> ConfirmingOnChain -> VerifyingBackend` and leaves the
    /// controller in `Executing`. Returns the transfer's transaction hash.
    pub async fn pay(&mut self) -> Result<H256> {
        if self.check_expiry() {
            return Err(self.expired_error());
        }
        self.require(HandshakeState::AwaitingPayment, "pay")?;

        let Some(challenge) = self.challenge.clone() else {
            return Err(ClientError::InvalidState {
                operation: "pay",
                state: "no outstanding challenge".to_string(),
            });
        };

        let amount = match challenge.amount_wei() {
            Ok(amount) => amount,
            Err(e) => return Err(self.fail(e)),
        };
        let transfer = TransferCall::new(
            challenge.payment.token_address,
            challenge.payment.recipient_address,
            amount,
        );
        let tx = transfer.to_transaction(self.session.wallet_address);

        self.transition(HandshakeState::Submitting);

        let window = challenge.remaining_at(Utc::now());
        let wallet = Arc::clone(&self.wallet);
        let cancel = self.cancel.clone();
        let submitted = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            _ = tokio::time::sleep(window) => Some(Err(ClientError::ChallengeExpired {
                job_id: challenge.job_id.clone(),
            })),
            sent = wallet.send_transaction(tx) => Some(sent),
        };

        let tx_hash = match submitted {
            None => return Err(self.abort_cancelled()),
            Some(Err(ClientError::ChallengeExpired { .. })) => {
                self.expire();
                return Err(self.expired_error());
            }
            Some(Err(e)) => return Err(self.fail(e)),
            Some(Ok(tx_hash)) => tx_hash,
        };

        info!("📤 Transfer submitted: {:?}", tx_hash);
        self.tx_hash = Some(tx_hash);
        self.emit(HandshakeEvent::TransactionSubmitted { tx_hash });
        self.transition(HandshakeState::ConfirmingOnChain);

        self.confirm_on_chain(tx_hash).await?;
        self.verify_backend(tx_hash).await?;
        Ok(tx_hash)
    }

    /// Polls for the receipt until it is mined or the confirmation ceiling passes
    async fn confirm_on_chain(&mut self, tx_hash: H256) -> Result<TransactionReceipt> {
        let wallet = Arc::clone(&self.wallet);
        let cancel = self.cancel.clone();
        let ceiling = self.policy.confirmation_timeout;
        let deadline = tokio::time::Instant::now() + ceiling;
        let timeout = ClientError::ConfirmationTimeout {
            tx_hash,
            waited_secs: ceiling.as_secs(),
        };

        loop {
            let lookup = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(self.abort_cancelled()),
                _ = tokio::time::sleep_until(deadline) => None,
                lookup = wallet.transaction_receipt(tx_hash) => Some(lookup),
            };

            match lookup {
                None => return Err(self.fail(timeout)),
                Some(Err(e)) => return Err(self.fail(e)),
                Some(Ok(Some(receipt))) => {
                    if receipt.status != Some(U64::from(1)) {
                        return Err(self.fail(ClientError::TransactionReverted { tx_hash }));
                    }
                    let block_number = receipt.block_number.map(|n| n.as_u64());
                    info!("⛓️ Transfer {:?} confirmed in block {:?}", tx_hash, block_number);
                    self.emit(HandshakeEvent::TransactionConfirmed {
                        tx_hash,
                        block_number,
                    });
                    return Ok(receipt);
                }
                Some(Ok(None)) => debug!("Receipt for {:?} not available yet", tx_hash),
            }

            let timed_out = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(self.abort_cancelled()),
                _ = tokio::time::sleep_until(deadline) => true,
                _ = tokio::time::sleep(self.policy.receipt_poll_interval) => false,
            };
            if timed_out {
                return Err(self.fail(timeout));
            }
        }
    }

    /// Asks the backend to confirm the payment, retrying up to the policy's bound
    async fn verify_backend(&mut self, tx_hash: H256) -> Result<VerificationResult> {
        self.transition(HandshakeState::VerifyingBackend);

        let confirmation = self.confirmation(tx_hash)?;
        let backend = Arc::clone(&self.backend);
        let cancel = self.cancel.clone();
        let max_attempts = self.policy.max_verify_attempts();

        for attempt in 1..=max_attempts {
            self.emit(HandshakeEvent::VerificationAttempt {
                attempt,
                max_attempts,
            });

            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                response = backend.verify_payment(&confirmation) => Some(response),
            };

            match response {
                None => return Err(self.abort_cancelled()),
                Some(Ok(result)) if result.status.is_paid() => {
                    info!(
                        "✅ Payment for job {} verified ({:?})",
                        confirmation.job_id, result.status
                    );
                    self.challenge = None;
                    self.transition(HandshakeState::Executing);
                    return Ok(result);
                }
                Some(Ok(result)) => debug!(
                    "Payment not detected yet ({}/{}): {}",
                    attempt,
                    max_attempts,
                    result.message.as_deref().unwrap_or("no message")
                ),
                Some(Err(ClientError::ChallengeExpired { .. })) => {
                    self.expire();
                    return Err(self.expired_error());
                }
                Some(Err(e)) if e.is_transient() => {
                    warn!("Verification attempt {}/{} failed: {}", attempt, max_attempts, e)
                }
                Some(Err(e)) => return Err(self.fail(e)),
            }

            if attempt < max_attempts {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(self.abort_cancelled()),
                    _ = tokio::time::sleep(self.policy.verify_retry_delay) => {}
                }
            }
        }

        Err(self.fail(ClientError::VerificationTimeout {
            attempts: max_attempts,
        }))
    }

    /// Repeats verification for the already-paid job without advancing the handshake
    ///
    /// The backend answers `already_paid` for a hash it has accepted before; the job is
    /// never executed a second time.
    pub async fn reverify(&self) -> Result<VerificationResult> {
        if !matches!(
            self.state,
            HandshakeState::Executing | HandshakeState::Completed
        ) {
            return Err(self.invalid_state("reverify"));
        }
        let tx_hash = self.tx_hash.ok_or_else(|| self.invalid_state("reverify"))?;
        let confirmation = self.confirmation(tx_hash)?;
        self.backend.verify_payment(&confirmation).await
    }

    pub async fn execute(&mut self) -> Result<ExecutionTranscript> {
        self.execute_with(|_| {}).await
    }

    /// Streams the paid job's output, calling `on_event` for each event in order
    ///
    /// A job that reports an `error` event leaves the controller in `Failed`; its
    /// transcript is still returned.
    pub async fn execute_with<F>(&mut self, mut on_event: F) -> Result<ExecutionTranscript>
    where
        F: FnMut(&OutputEvent),
    {
        self.require(HandshakeState::Executing, "execute")?;
        if self.executed {
            return Err(self.invalid_state("execute"));
        }
        let job_id = self
            .job_id
            .clone()
            .ok_or_else(|| self.invalid_state("execute"))?;
        self.executed = true;

        let backend = Arc::clone(&self.backend);
        let cancel = self.cancel.clone();
        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            opened = backend.execute(&job_id) => Some(opened),
        };
        let stream = match opened {
            None => return Err(self.abort_cancelled()),
            Some(Err(e)) => return Err(self.fail(e)),
            Some(Ok(stream)) => stream,
        };

        info!("🚀 Executing job {}", job_id);
        let events = self.events.clone();
        let drained = execution::drain(stream, &cancel, |event| {
            if let Some(events) = &events {
                let _ = events.try_send(HandshakeEvent::Output(event.clone()));
            }
            on_event(event);
        })
        .await;

        match drained {
            Err(ClientError::Cancelled) => Err(self.abort_cancelled()),
            Err(e) => Err(self.fail(e)),
            Ok(transcript) => {
                match &transcript.outcome {
                    Some(ExecutionOutcome::Completed(message)) => {
                        info!("🏁 Job {} completed: {}", job_id, message);
                        self.transition(HandshakeState::Completed);
                    }
                    Some(ExecutionOutcome::Failed(message)) => {
                        self.fail(ClientError::JobFailed(message.clone()));
                    }
                    None => {
                        self.fail(ClientError::Stream(
                            "stream closed before a terminal event".to_string(),
                        ));
                    }
                }
                Ok(transcript)
            }
        }
    }

    /// Request, pay and execute in one call
    pub async fn run<F>(
        &mut self,
        job_type: &str,
        params: JobParams,
        on_event: F,
    ) -> Result<ExecutionTranscript>
    where
        F: FnMut(&OutputEvent),
    {
        self.request_job(job_type, params).await?;
        self.pay().await?;
        self.execute_with(on_event).await
    }

    /// Aborts any in-flight attempt and returns to `Idle`
    ///
    /// A transfer already broadcast is not reverted; its hash is logged.
    pub fn cancel(&mut self) {
        if self.state == HandshakeState::Idle {
            return;
        }
        self.cancel.cancel();
        if let Some(tx_hash) = self.tx_hash {
            if !self.state.is_terminal() {
                warn!("Cancelled after broadcasting transfer {:?}", tx_hash);
            }
        }
        self.reset();
    }

    /// Back to `Idle` with every per-job field cleared; the catalog is kept
    pub fn reset(&mut self) {
        self.challenge = None;
        self.job_id = None;
        self.tx_hash = None;
        self.executed = false;
        if self.cancel.is_cancelled() {
            self.cancel = CancellationToken::new();
        }
        if self.state != HandshakeState::Idle {
            self.transition(HandshakeState::Idle);
        }
    }

    fn confirmation(&self, tx_hash: H256) -> Result<PaymentConfirmation> {
        let job_id = self
            .job_id
            .clone()
            .ok_or_else(|| self.invalid_state("verify"))?;
        Ok(PaymentConfirmation {
            job_id,
            tx_hash: format!("{:?}", tx_hash),
        })
    }

    fn require(&self, expected: HandshakeState, operation: &'static str) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(self.invalid_state(operation))
        }
    }

    fn invalid_state(&self, operation: &'static str) -> ClientError {
        ClientError::InvalidState {
            operation,
            state: self.state.to_string(),
        }
    }

    fn expired_error(&self) -> ClientError {
        ClientError::ChallengeExpired {
            job_id: self.job_id.clone().unwrap_or_default(),
        }
    }

    fn expire(&mut self) {
        warn!(
            "⏰ Payment window expired for job {}",
            self.job_id.as_deref().unwrap_or("?")
        );
        self.challenge = None;
        self.transition(HandshakeState::Expired);
    }

    fn fail(&mut self, err: ClientError) -> ClientError {
        error!("❌ Handshake failed in {}: {}", self.state.name(), err);
        if let Some(tx_hash) = self.tx_hash {
            error!("   Transfer {:?} was broadcast for this job", tx_hash);
        }
        self.challenge = None;
        self.transition(HandshakeState::Failed(err.clone()));
        err
    }

    fn abort_cancelled(&mut self) -> ClientError {
        info!("Handshake cancelled in {}", self.state.name());
        self.reset();
        ClientError::Cancelled
    }

    fn transition(&mut self, next: HandshakeState) {
        let from = self.state.name();
        debug!("Handshake {} -> {}", from, next);
        self.state = next.clone();
        self.emit(HandshakeEvent::StateChanged { from, to: next });
    }

    fn emit(&self, event: HandshakeEvent) {
        if let Some(events) = &self.events {
            if events.try_send(event).is_err() {
                debug!("Handshake event dropped; subscriber is full or gone");
            }
        }
    }
}
