//! Error taxonomy for the toolkit's fallible boundaries.
//!
//! Codec failures on the *deserialize* path are value-encoded as `None`
//! (a malformed frame from a shared medium is routine, not exceptional) so
//! no error type exists for it. Everything else that can fail gets a
//! concrete `thiserror` variant instead of a blanket dynamic error.

use std::io;
use thiserror::Error;

/// Serialization can only fail one way: an over-long payload.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("payload of {0} bytes exceeds the 256-byte emission limit")]
    PayloadTooLarge(usize),
}

/// Failures in opening or operating the virtual interface.
#[derive(Debug, Error)]
pub enum InterfaceError {
    #[error("failed to open TUN device `{device}`: {source}")]
    Setup {
        device: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to write to TUN device: {0}")]
    Send(#[source] io::Error),
    #[error("failed to read from TUN device: {0}")]
    Receive(#[source] io::Error),
}

/// Failures in reading or parsing a topology file.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TopologyError {
    #[error("failed to read topology file `{path}`: {message}")]
    Read { path: String, message: String },
    #[error("failed to parse topology file `{path}`: {message}")]
    Parse { path: String, message: String },
    #[error("field `{field}` with value `{value}` is not a valid IPv4 address")]
    InvalidAddress { field: String, value: String },
}
