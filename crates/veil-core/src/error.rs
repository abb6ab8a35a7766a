//! Error types for Veil

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Invalid router id: {0}")]
    InvalidRouterId(String),

    #[error("Signature error: {0}")]
    Signature(#[from] ed25519_dalek::SignatureError),
}

pub type Result<T> = std::result::Result<T, Error>;
