//! Reversible obfuscation for answers kept in client-visible storage.
//!
//! Not encryption. The answer is reversed and then base64 encoded so it does
//! not sit in plain text inside saved snapshots and stats.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use log::debug;

pub fn encode(name: &str) -> String {
    let reversed: String = name.chars().rev().collect();
    STANDARD.encode(reversed.as_bytes())
}

/// Malformed tokens decode to an empty string.
pub fn decode(token: &str) -> String {
    let bytes = match STANDARD.decode(token.trim()) {
        Ok(bytes) => bytes,
        Err(err) => {
            debug!(target: "storage", "Ignoring undecodable answer token: {}", err);
            return String::new();
        }
    };
    match String::from_utf8(bytes) {
        Ok(reversed) => reversed.chars().rev().collect(),
        Err(err) => {
            debug!(target: "storage", "Answer token is not utf-8: {}", err);
            String::new()
        }
    }
}
