//! Error type for the streaming client.

use thiserror::Error;

/// Errors surfaced to the caller.
///
/// Only programmer errors (calling things in the wrong order, bad
/// configuration) and undecodable packets are errors. Lost requests, slow
/// frames and unknown block ids inside chunk payloads degrade silently.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("cannot {action} before the world is initialized; call `World::init` first")]
    NotInitialized { action: &'static str },

    #[error("world has already been initialized; `World::init` must only be called once")]
    AlreadyInitialized,

    #[error("world has not received any initialization data; wait for the server INIT message")]
    MissingInitData,

    #[error("invalid world parameters: {0}")]
    InvalidParams(String),

    #[error("block id {0} is not registered")]
    UnknownBlock(u32),

    #[error("sunlight intensity {value} must be within 0..={max}")]
    SunlightOutOfRange { value: f32, max: u32 },

    #[error("malformed message: {0}")]
    MalformedMessage(#[from] serde_json::Error),

    #[error("transport is closed")]
    TransportClosed,
}

pub type Result<T> = std::result::Result<T, StreamError>;
