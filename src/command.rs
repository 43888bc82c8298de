//! Arm/disarm requests crossing from the network side (or the pad button)
//! into the control loop.

use crate::error::FlightError;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "lowercase")]
pub enum CommandRequest {
    Arm,
    Disarm,
}

impl CommandRequest {
    /// Accepts `arm` / `disarm` in any case, or `{"command":"arm"}`.
    /// Anything else is a protocol fault and never maps to a command.
    pub fn parse(payload: &str) -> Result<Self, FlightError> {
        let trimmed = payload.trim();
        if trimmed.eq_ignore_ascii_case("arm") {
            return Ok(CommandRequest::Arm);
        }
        if trimmed.eq_ignore_ascii_case("disarm") {
            return Ok(CommandRequest::Disarm);
        }
        if trimmed.starts_with('{') {
            if let Ok(request) = serde_json::from_str::<CommandRequest>(trimmed) {
                return Ok(request);
            }
        }
        Err(FlightError::Protocol {
            payload: payload.to_string(),
        })
    }
}

impl fmt::Display for CommandRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandRequest::Arm => f.write_str("arm"),
            CommandRequest::Disarm => f.write_str("disarm"),
        }
    }
}

/// Bounded queue between any number of producers and the control loop.
pub fn command_channel(capacity: usize) -> (CommandSender, CommandQueue) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (CommandSender { tx }, CommandQueue { rx })
}

#[derive(Clone)]
pub struct CommandSender {
    tx: mpsc::Sender<CommandRequest>,
}

impl CommandSender {
    /// Never waits. A full queue is reported instead.
    pub fn submit(&self, request: CommandRequest) -> Result<(), FlightError> {
        match self.tx.try_send(request) {
            Ok(()) => {
                debug!("Queued {} command", request);
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(FlightError::QueueFull),
            Err(TrySendError::Closed(_)) => Err(FlightError::QueueClosed),
        }
    }

    /// Parses a raw gateway payload and queues it. Malformed payloads are dropped.
    pub fn submit_payload(&self, payload: &str) -> Result<CommandRequest, FlightError> {
        let request = CommandRequest::parse(payload).map_err(|e| {
            warn!("Ignoring malformed command payload {:?}", payload);
            e
        })?;
        self.submit(request)?;
        Ok(request)
    }
}

pub struct CommandQueue {
    rx: mpsc::Receiver<CommandRequest>,
}

impl CommandQueue {
    /// Oldest pending request, if any.
    pub fn next(&mut self) -> Option<CommandRequest> {
        match self.rx.try_recv() {
            Ok(request) => Some(request),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }
}
