//! The renderer bridge.
//!
//! The interpreter mirrors its output DOM to an external renderer through a
//! request/response message protocol. Every call sends one
//! [`RendererRequest`] and blocks (with a timeout) for the matching
//! [`RendererResponse`]; `retCode == 200` carries a handle in
//! `resultValue`, anything else is a refusal.
//!
//! The transport behind the messages is pluggable: production hosts hand
//! the link a socket-backed transport, tests use [`RecordingTransport`] to
//! capture the message sequence, and [`ChannelTransport`] pairs with a
//! renderer running on another thread.

mod link;
mod message;
mod transport;

pub use link::{RendererLink, DEFAULT_TIMEOUT};
pub use message::{Operation, RendererRequest, RendererResponse, TargetKind};
pub use transport::{ChannelTransport, RecordingTransport, RendererTransport};

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum RendererError {
    /// The renderer answered with a non-200 code.
    #[error("server refused: retCode {0}")]
    ServerRefused(u16),

    /// No response arrived within the configured timeout.
    #[error("renderer timed out")]
    Timeout,

    /// The transport is gone (renderer hung up).
    #[error("renderer disconnected")]
    Disconnected,
}
