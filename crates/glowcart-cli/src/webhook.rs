//! Signing and delivering test webhook payloads.

use chrono::Utc;
use glowcart_core::{sign_header, SignatureMode, SIGNATURE_HEADER};

/// Builds the `Paymongo-Signature` header value for `body`.
pub(crate) fn signature_header(
    body: &[u8],
    secret: &str,
    timestamp: Option<i64>,
    live: bool,
) -> String {
    let mode = if live {
        SignatureMode::Live
    } else {
        SignatureMode::Test
    };
    let timestamp = timestamp.unwrap_or_else(|| Utc::now().timestamp());
    sign_header(body, secret, timestamp, mode)
}

/// POSTs a signed payload with Basic auth and prints the response.
///
/// # Errors
///
/// Returns an error if the request cannot be sent or the endpoint answers
/// with a non-2xx status.
pub(crate) async fn run_send(
    url: &str,
    body: Vec<u8>,
    signature: &str,
    user: &str,
    password: &str,
) -> anyhow::Result<()> {
    let response = reqwest::Client::new()
        .post(url)
        .basic_auth(user, Some(password))
        .header(SIGNATURE_HEADER, signature)
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .body(body)
        .send()
        .await?;

    let status = response.status();
    let text = response.text().await?;
    println!("{status}");
    println!("{text}");

    if !status.is_success() {
        anyhow::bail!("webhook endpoint answered {status}");
    }
    Ok(())
}
