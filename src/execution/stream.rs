// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use bytes::Bytes;
use futures::stream::{BoxStream, Stream, StreamExt};
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::{debug, warn};

use crate::api::sse::SseDecoder;
use crate::error::{ClientError, Result};
use crate::jobs::OutputEvent;

/// Typed output events for one job execution
///
/// Finite and not restartable: after a `complete` or `error` event, a transport error,
/// or a premature end of stream, the underlying connection is dropped and the stream
/// yields `None` forever.
pub struct ExecutionStream {
    job_id: String,
    body: Option<BoxStream<'static, Result<Bytes>>>,
    decoder: SseDecoder,
    ready: VecDeque<Result<OutputEvent>>,
}

impl ExecutionStream {
    pub fn new(job_id: impl Into<String>, body: BoxStream<'static, Result<Bytes>>) -> Self {
        Self {
            job_id: job_id.into(),
            body: Some(body),
            decoder: SseDecoder::new(),
            ready: VecDeque::new(),
        }
    }

    /// Stream over an in-memory SSE body, delivered chunk by chunk
    pub fn from_chunks<I>(job_id: impl Into<String>, chunks: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Bytes>,
        I::IntoIter: Send + 'static,
    {
        let body = futures::stream::iter(chunks.into_iter().map(|chunk| Ok::<Bytes, ClientError>(chunk.into())));
        Self::new(job_id, body.boxed())
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn is_finished(&self) -> bool {
        self.body.is_none() && self.ready.is_empty()
    }

    fn close(&mut self) {
        if self.body.take().is_some() {
            debug!("Closed execution stream for job {}", self.job_id);
        }
    }

    fn accept_chunk(&mut self, chunk: &[u8]) {
        for frame in self.decoder.push(chunk) {
            match OutputEvent::try_from(frame) {
                Ok(event) => {
                    let terminal = event.is_terminal();
                    self.ready.push_back(Ok(event));
                    if terminal {
                        self.close();
                        return;
                    }
                }
                Err(e) => {
                    warn!("Rejected stream frame for job {}: {}", self.job_id, e);
                    self.ready.push_back(Err(e));
                    self.close();
                    return;
                }
            }
        }
    }
}

impl Stream for ExecutionStream {
    type Item = Result<OutputEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(item) = self.ready.pop_front() {
                return Poll::Ready(Some(item));
            }

            let Some(body) = self.body.as_mut() else {
                return Poll::Ready(None);
            };

            match body.poll_next_unpin(cx) {
                Poll::Ready(Some(Ok(chunk))) => self.accept_chunk(&chunk),
                Poll::Ready(Some(Err(e))) => {
                    self.close();
                    let message = match e {
                        ClientError::Stream(message) => message,
                        other => other.to_string(),
                    };
                    return Poll::Ready(Some(Err(ClientError::Stream(message))));
                }
                Poll::Ready(None) => {
                    self.close();
                    return Poll::Ready(Some(Err(ClientError::Stream(
                        "stream closed before a terminal event".to_string(),
                    ))));
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
