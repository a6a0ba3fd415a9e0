// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Server-Sent Events decoding
//!
//! Bytes arrive in arbitrary chunks; [`SseDecoder`] buffers partial lines and emits a
//! [`SseFrame`] for every blank-line-terminated block. Frames are then mapped onto the
//! closed [`OutputEvent`] set, and anything outside it is rejected here rather than
//! leaking untyped text into the handshake.

use crate::error::{ClientError, Result};
use crate::jobs::OutputEvent;

/// One dispatched SSE block
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
}

#[derive(Debug, Default)]
struct PendingFrame {
    event: Option<String>,
    data_lines: Vec<String>,
    id: Option<String>,
}

impl PendingFrame {
    fn is_empty(&self) -> bool {
        self.event.is_none() && self.data_lines.is_empty()
    }

    fn into_frame(self) -> SseFrame {
        SseFrame {
            event: self.event,
            data: self.data_lines.join("\n"),
            id: self.id,
        }
    }
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    pending: PendingFrame,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk and returns every frame it completed, in order
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);

            if line.is_empty() {
                let pending = std::mem::take(&mut self.pending);
                if !pending.is_empty() {
                    frames.push(pending.into_frame());
                }
            } else {
                self.apply_line(&line);
            }
        }

        frames
    }

    /// Bytes buffered without a terminating blank line
    pub fn has_partial_frame(&self) -> bool {
        !self.buffer.is_empty() || !self.pending.is_empty()
    }

    fn apply_line(&mut self, line: &str) {
        if line.starts_with(':') {
            return;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.pending.event = Some(value.to_string()),
            "data" => self.pending.data_lines.push(value.to_string()),
            "id" => self.pending.id = Some(value.to_string()),
            _ => {}
        }
    }
}

impl TryFrom<SseFrame> for OutputEvent {
    type Error = ClientError;

    fn try_from(frame: SseFrame) -> Result<Self> {
        match frame.event.as_deref().unwrap_or("message") {
            "start" => Ok(OutputEvent::Start(frame.data)),
            "output" => Ok(OutputEvent::Output(frame.data)),
            "complete" => Ok(OutputEvent::Complete(frame.data)),
            "error" => Ok(OutputEvent::Error(frame.data)),
            other => Err(ClientError::ProtocolViolation(format!(
                "unexpected stream event '{}'",
                other
            ))),
        }
    }
}
