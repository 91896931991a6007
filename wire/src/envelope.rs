use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Text-safe wrapper around a binary payload.
///
/// A deployment picks exactly one envelope; payloads are never sniffed. Base64 is
/// canonical because it is what the rule engine emits when forwarding device messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Envelope {
    #[default]
    Base64,
    Hex,
    Raw,
}

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("invalid base64 envelope: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("invalid hex envelope: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("unknown envelope {0:?}, expected base64, hex or raw")]
    Unknown(String),
}

impl Envelope {
    pub fn unwrap(self, payload: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
        match self {
            Envelope::Base64 => Ok(STANDARD.decode(payload.trim_ascii())?),
            Envelope::Hex => Ok(hex::decode(payload.trim_ascii())?),
            Envelope::Raw => Ok(payload.to_vec()),
        }
    }

    pub fn wrap(self, bytes: &[u8]) -> Vec<u8> {
        match self {
            Envelope::Base64 => STANDARD.encode(bytes).into_bytes(),
            Envelope::Hex => hex::encode(bytes).into_bytes(),
            Envelope::Raw => bytes.to_vec(),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Envelope::Base64 => "base64",
            Envelope::Hex => "hex",
            Envelope::Raw => "raw",
        }
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Envelope {
    type Err = EnvelopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "base64" => Ok(Envelope::Base64),
            "hex" => Ok(Envelope::Hex),
            "raw" => Ok(Envelope::Raw),
            _ => Err(EnvelopeError::Unknown(s.to_string())),
        }
    }
}
