//! Challenge generation and the canonical transport encoding
//!
//! All binary ceremony material (challenges, user handles, credential ids,
//! authenticator payloads) crosses process boundaries as base64url without
//! padding. Encoding is done exactly once at the wire, decoding exactly once
//! on receipt; everything in between stays raw bytes or the canonical string.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64, Engine as _};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::CeremonyError;

/// Generate `size_bytes` of challenge material from the OS entropy source.
///
/// Entropy exhaustion aborts the process. It is the one condition this
/// system does not try to recover from, because a predictable challenge is
/// worse than no service.
pub fn new_challenge(size_bytes: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; size_bytes];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// Generate a random opaque user handle. Same entropy source as challenges;
/// the handle carries no derivable relationship to the username.
pub fn new_user_handle(size_bytes: usize) -> Vec<u8> {
    new_challenge(size_bytes)
}

/// Encode binary material for the wire and for session storage.
pub fn encode(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// Decode a canonical base64url value. Padded or otherwise non-canonical
/// input is rejected, never coerced.
pub fn decode(value: &str) -> Result<Vec<u8>, CeremonyError> {
    Ok(BASE64.decode(value)?)
}
