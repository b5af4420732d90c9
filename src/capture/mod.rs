//! Passive loopback capture.
//!
//! A blocking reader pulls frames off the loopback interface and forwards TCP
//! payloads over a channel; [`CaptureEngine`] turns those into requests for
//! the target and hands them to discovery.

mod decode;
mod engine;
mod http;
mod source;

pub use engine::CaptureEngine;
pub use source::{open_loopback, spawn_reader};

use thiserror::Error;

/// Frames buffered between the reader thread and the async consumer.
pub const CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("unsupported capture environment: {0}")]
    Unsupported(String),

    #[error("failed to open capture on {device}: {message}")]
    Open { device: String, message: String },

    #[error("failed to set capture filter {filter:?}: {message}")]
    Filter { filter: String, message: String },

    #[error("capture read failed: {0}")]
    Read(String),

    #[error("capture source closed")]
    Closed,
}
