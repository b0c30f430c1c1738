//! HMAC-SHA256 webhook signatures.
//!
//! Two header shapes are accepted:
//!
//! - a bare hex digest, computed over the raw request body;
//! - the provider's structured form `t=<unix>,te=<hex>,li=<hex>`, computed
//!   over `"<t>." + body`, where `te` carries the test-mode signature and `li`
//!   the live-mode one.
//!
//! Digests are compared in constant time.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::event::{parse_event, EventError, ParsedEvent};

type HmacSha256 = Hmac<Sha256>;

/// Name of the request header carrying the signature.
pub const SIGNATURE_HEADER: &str = "paymongo-signature";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignatureMode {
    #[default]
    Test,
    Live,
}

#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("webhook secret is not configured")]
    MissingSecret,

    #[error("signature header is missing")]
    MissingHeader,

    #[error("signature header is malformed: {0}")]
    MalformedHeader(String),

    #[error("signature does not match payload")]
    Mismatch,

    #[error(transparent)]
    Payload(#[from] EventError),
}

impl SignatureError {
    /// `true` for failures caused by server configuration rather than the request.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(self, SignatureError::MissingSecret)
    }
}

fn mac_for(secret: &str) -> HmacSha256 {
    // HMAC accepts keys of any length, so this never fails.
    <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("HMAC-SHA256 accepts any key length"))
}

fn digest(secret: &str, prefix: Option<&str>, body: &[u8]) -> Vec<u8> {
    let mut mac = mac_for(secret);
    if let Some(prefix) = prefix {
        mac.update(prefix.as_bytes());
        mac.update(b".");
    }
    mac.update(body);
    mac.finalize().into_bytes().to_vec()
}

/// Hex HMAC-SHA256 of `body` under `secret`.
#[must_use]
pub fn sign(body: &[u8], secret: &str) -> String {
    hex::encode(digest(secret, None, body))
}

/// Builds a structured signature header for `body` at unix time `timestamp`.
///
/// The component for `mode` carries the signature; the other one is left empty,
/// matching what the provider sends.
#[must_use]
pub fn sign_header(body: &[u8], secret: &str, timestamp: i64, mode: SignatureMode) -> String {
    let prefix = timestamp.to_string();
    let signature = hex::encode(digest(secret, Some(prefix.as_str()), body));
    match mode {
        SignatureMode::Test => format!("t={timestamp},te={signature},li="),
        SignatureMode::Live => format!("t={timestamp},te=,li={signature}"),
    }
}

#[derive(Debug, PartialEq, Eq)]
struct StructuredHeader<'a> {
    timestamp: &'a str,
    test: &'a str,
    live: &'a str,
}

fn parse_structured(header: &str) -> Result<Option<StructuredHeader<'_>>, SignatureError> {
    if !header.contains('=') {
        return Ok(None);
    }

    let mut timestamp = None;
    let mut test = "";
    let mut live = "";
    for part in header.split(',') {
        let (key, value) = part
            .trim()
            .split_once('=')
            .ok_or_else(|| SignatureError::MalformedHeader(format!("bad component '{part}'")))?;
        match key {
            "t" => timestamp = Some(value),
            "te" => test = value,
            "li" => live = value,
            _ => {}
        }
    }

    let timestamp =
        timestamp.ok_or_else(|| SignatureError::MalformedHeader("missing `t`".to_string()))?;
    if timestamp.parse::<i64>().is_err() {
        return Err(SignatureError::MalformedHeader(format!(
            "timestamp '{timestamp}' is not an integer"
        )));
    }

    Ok(Some(StructuredHeader {
        timestamp,
        test,
        live,
    }))
}

fn constant_time_matches(expected: &[u8], provided_hex: &str) -> bool {
    match hex::decode(provided_hex.trim()) {
        Ok(provided) => expected.ct_eq(&provided).into(),
        Err(_) => false,
    }
}

/// Checks `header` against the HMAC of `body`.
///
/// # Errors
///
/// - [`SignatureError::MissingSecret`] when `secret` is `None` or empty.
/// - [`SignatureError::MissingHeader`] / [`SignatureError::MalformedHeader`]
///   when the header is absent or unparseable.
/// - [`SignatureError::Mismatch`] when the digest does not match.
pub fn verify_signature(
    body: &[u8],
    header: Option<&str>,
    secret: Option<&str>,
    mode: SignatureMode,
) -> Result<(), SignatureError> {
    let secret = secret
        .filter(|s| !s.is_empty())
        .ok_or(SignatureError::MissingSecret)?;
    let header = header
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .ok_or(SignatureError::MissingHeader)?;

    let matched = match parse_structured(header)? {
        Some(parts) => {
            let provided = match mode {
                SignatureMode::Test => parts.test,
                SignatureMode::Live => parts.live,
            };
            !provided.is_empty()
                && constant_time_matches(&digest(secret, Some(parts.timestamp), body), provided)
        }
        None => constant_time_matches(&digest(secret, None, body), header),
    };

    if matched {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Verifies the signature and, only then, parses the body into an event.
///
/// # Errors
///
/// Any [`verify_signature`] error, or [`SignatureError::Payload`] when the
/// verified body is not a valid event.
pub fn verify_event(
    body: &[u8],
    header: Option<&str>,
    secret: Option<&str>,
    mode: SignatureMode,
) -> Result<ParsedEvent, SignatureError> {
    verify_signature(body, header, secret, mode)?;
    Ok(parse_event(body)?)
}
