use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine;
use serde_json::Value;
use thiserror::Error;
use tracing::trace;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Malformed token")]
    Malformed,
}

/// The only claim the session cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedToken {
    /// `exp` claim, seconds since the Unix epoch
    pub expires_at: i64,
}

/// Decodes `header.payload.signature` tokens. The signature is never checked;
/// that is the server's job.
pub struct TokenCodec;

impl TokenCodec {
    pub fn decode(raw: &str) -> Result<DecodedToken, DecodeError> {
        let parts: Vec<&str> = raw.split('.').collect();
        if parts.len() != 3 {
            trace!(segments = parts.len(), "Token does not have three segments");
            return Err(DecodeError::Malformed);
        }

        let bytes = Self::decode_segment(parts[1]).ok_or(DecodeError::Malformed)?;
        let payload: Value = serde_json::from_slice(&bytes).map_err(|e| {
            trace!(error = %e, "Token payload is not JSON");
            DecodeError::Malformed
        })?;

        let exp = payload
            .as_object()
            .and_then(|claims| claims.get("exp"))
            .ok_or(DecodeError::Malformed)?;

        let expires_at = match exp.as_i64() {
            Some(secs) => secs,
            None => match exp.as_f64() {
                // The clock reports whole seconds, so rounding a fractional
                // expiry up keeps `exp <= now` exact.
                Some(secs) if secs.is_finite() => secs.ceil() as i64,
                _ => return Err(DecodeError::Malformed),
            },
        };

        Ok(DecodedToken { expires_at })
    }

    /// An unreadable token counts as expired.
    pub fn is_expired(raw: &str, now: i64) -> bool {
        match Self::decode(raw) {
            Ok(decoded) => decoded.expires_at <= now,
            Err(_) => true,
        }
    }

    /// Accepts URL-safe or standard alphabet, padded or not.
    fn decode_segment(segment: &str) -> Option<Vec<u8>> {
        let trimmed = segment.trim_end_matches('=');
        if trimmed.is_empty() {
            return None;
        }
        URL_SAFE_NO_PAD
            .decode(trimmed)
            .or_else(|_| STANDARD_NO_PAD.decode(trimmed))
            .ok()
    }
}

/// Build an unsigned token carrying the given claims. Test helper.
#[cfg(test)]
pub(crate) fn make_token(claims: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}.{}.signature", header, payload)
}

#[cfg(test)]
pub(crate) fn token_expiring_at(exp: i64) -> String {
    make_token(&serde_json::json!({ "sub": "a@b.com", "exp": exp }))
}
