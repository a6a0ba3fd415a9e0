// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Execution stream consumption
//!
//! [`ExecutionStream`] turns the SSE body of `GET /api/jobs/execute/:id` into typed
//! events; [`drain`] renders them into an [`ExecutionTranscript`] in arrival order.

pub mod stream;

pub use stream::ExecutionStream;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::error::{ClientError, Result};
use crate::jobs::OutputEvent;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Completed(String),
    Failed(String),
}

/// Everything a job execution printed, in the order it arrived
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionTranscript {
    pub job_id: String,
    pub started: Option<String>,
    lines: Vec<String>,
    pub outcome: Option<ExecutionOutcome>,
}

impl ExecutionTranscript {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            ..Default::default()
        }
    }

    pub fn record(&mut self, event: OutputEvent) {
        match event {
            OutputEvent::Start(text) => self.started = Some(text),
            OutputEvent::Output(text) => self.lines.push(text),
            OutputEvent::Complete(text) => self.outcome = Some(ExecutionOutcome::Completed(text)),
            OutputEvent::Error(text) => self.outcome = Some(ExecutionOutcome::Failed(text)),
        }
    }

    /// Output payloads concatenated exactly as received
    pub fn output(&self) -> String {
        self.lines.concat()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.outcome, Some(ExecutionOutcome::Completed(_)))
    }
}

/// Consumes the stream to its terminal event, calling `on_event` for each event first
pub async fn drain<F>(
    mut stream: ExecutionStream,
    cancel: &CancellationToken,
    mut on_event: F,
) -> Result<ExecutionTranscript>
where
    F: FnMut(&OutputEvent),
{
    let mut transcript = ExecutionTranscript::new(stream.job_id());

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return Err(ClientError::Cancelled),
            next = stream.next() => next,
        };

        match next {
            Some(Ok(event)) => {
                on_event(&event);
                transcript.record(event);
            }
            Some(Err(e)) => return Err(e),
            None => break,
        }
    }

    Ok(transcript)
}
