//! Newline-delimited JSON framing between the server and its clients.
//!
//! Every frame is one JSON document terminated by `\n`.
//!
//! - server → client: [`ServerFrame`], internally tagged by `type`
//! - client → server: a bare observation (any JSON value)
//!
//! The first frame on every connection is `ServerFrame::Metadata`.

use openpi_runtime::{Actions, Observation, PolicyMetadata};
use serde::{Deserialize, Serialize};

/// A frame sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Metadata { metadata: PolicyMetadata },
    Actions { actions: Actions },
    Error { message: String },
}

impl ServerFrame {
    pub fn error(message: impl std::fmt::Display) -> Self {
        ServerFrame::Error {
            message: message.to_string(),
        }
    }

    /// Encode as a single `\n`-terminated line.
    pub fn encode(&self) -> serde_json::Result<Vec<u8>> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(line)
    }

    /// Decode one line (trailing whitespace allowed).
    pub fn decode(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line.trim_end())
    }
}

/// Encode an observation as a client request line.
pub fn encode_observation(observation: &Observation) -> serde_json::Result<Vec<u8>> {
    let mut line = serde_json::to_vec(observation)?;
    line.push(b'\n');
    Ok(line)
}

/// Parse a client request line. Bytes that are not UTF-8 are a decode error.
pub fn decode_observation(line: &[u8]) -> serde_json::Result<Observation> {
    serde_json::from_slice(line)
}
