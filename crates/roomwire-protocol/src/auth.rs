//! Bearer auth data for lobby requests and room-socket connects.
//!
//! The token is the base64 encoding of
//!
//! ```text
//! [nonce:8][unix seconds:8 BE][HMAC-SHA256(app key, user id ++ nonce ++ seconds):32]
//! ```
//!
//! A fresh nonce is drawn for every request, so the server can reject
//! replays within its freshness window.

use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::ProtocolError;

type HmacSha256 = Hmac<Sha256>;

const NONCE_LEN: usize = 8;
const TIME_LEN: usize = 8;
const MAC_LEN: usize = 32;
const AUTH_DATA_LEN: usize = NONCE_LEN + TIME_LEN + MAC_LEN;

fn mac(app_key: &[u8], user_id: &str, nonce: &[u8], time: &[u8]) -> Result<HmacSha256, ProtocolError> {
    let mut mac = HmacSha256::new_from_slice(app_key)
        .map_err(|e| ProtocolError::InvalidAuthData(e.to_string()))?;
    mac.update(user_id.as_bytes());
    mac.update(nonce);
    mac.update(time);
    Ok(mac)
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Generates auth data with a random nonce and the current time.
pub fn generate_auth_data(app_key: &[u8], user_id: &str) -> Result<String, ProtocolError> {
    generate_auth_data_at(app_key, user_id, rand::random(), unix_now())
}

/// Generates auth data for a fixed nonce and timestamp.
pub fn generate_auth_data_at(
    app_key: &[u8],
    user_id: &str,
    nonce: [u8; NONCE_LEN],
    unix_secs: u64,
) -> Result<String, ProtocolError> {
    let time = unix_secs.to_be_bytes();
    let sig = mac(app_key, user_id, &nonce, &time)?.finalize().into_bytes();

    let mut raw = Vec::with_capacity(AUTH_DATA_LEN);
    raw.extend_from_slice(&nonce);
    raw.extend_from_slice(&time);
    raw.extend_from_slice(&sig);
    Ok(STANDARD.encode(raw))
}

/// Formats auth data as an `Authorization` header value.
pub fn bearer(auth_data: &str) -> String {
    format!("Bearer {auth_data}")
}

/// Checks auth data against `app_key` and `user_id`. Tokens older than
/// `max_age_secs` relative to `now_secs`, or from the future by more than
/// the same margin, are rejected.
pub fn validate_auth_data(
    app_key: &[u8],
    user_id: &str,
    auth_data: &str,
    now_secs: u64,
    max_age_secs: u64,
) -> Result<(), ProtocolError> {
    let token = auth_data.strip_prefix("Bearer ").unwrap_or(auth_data);
    let raw = STANDARD
        .decode(token)
        .map_err(|e| ProtocolError::InvalidAuthData(e.to_string()))?;
    if raw.len() != AUTH_DATA_LEN {
        return Err(ProtocolError::InvalidAuthData(format!(
            "expected {AUTH_DATA_LEN} bytes, got {}",
            raw.len()
        )));
    }
    let (nonce, rest) = raw.split_at(NONCE_LEN);
    let (time, sig) = rest.split_at(TIME_LEN);

    mac(app_key, user_id, nonce, time)?
        .verify_slice(sig)
        .map_err(|_| ProtocolError::InvalidAuthData("signature mismatch".into()))?;

    let mut secs = [0u8; TIME_LEN];
    secs.copy_from_slice(time);
    let issued = u64::from_be_bytes(secs);
    if issued.abs_diff(now_secs) > max_age_secs {
        return Err(ProtocolError::InvalidAuthData(format!(
            "issued at {issued}, now {now_secs}"
        )));
    }
    Ok(())
}
