//! Payload signature verification (`X-Hub-Signature: sha1=<hex>`).
//!
//! The platform signs the raw request body with the app secret using HMAC-SHA1 and
//! sends the lowercase hex digest prefixed by the algorithm name. Verification runs
//! over the exact bytes received, before any JSON decoding.

use hmac::{Hmac, Mac};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

/// Request header carrying the body signature.
pub const SIGNATURE_HEADER: &str = "X-Hub-Signature";

/// The only digest encoding the platform uses for this header.
const SHA1_ENCODING: &str = "sha1";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature verification requested but no app secret is configured")]
    MissingSecret,
    #[error("missing X-Hub-Signature header")]
    MissingHeader,
    #[error("malformed X-Hub-Signature header: {0}")]
    MalformedHeader(String),
    #[error("unknown X-Hub-Signature header encoding, expected sha1: {0}")]
    UnsupportedEncoding(String),
    #[error("signature does not match payload")]
    SignatureMismatch,
}

/// Compute the header value (`sha1=<lowercase hex>`) for a body signed with `secret`.
pub fn sign(body: &[u8], secret: &str) -> String {
    format!("{}={}", SHA1_ENCODING, hex::encode(hmac_sha1(body, secret)))
}

fn hmac_sha1(body: &[u8], secret: &str) -> Vec<u8> {
    let mut mac = new_mac(secret);
    mac.update(body);
    mac.finalize().into_bytes().to_vec()
}

fn new_mac(secret: &str) -> HmacSha1 {
    HmacSha1::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size")
}

/// Verify `header` (the raw `X-Hub-Signature` value, if present) against `body`.
///
/// `secret` is the configured app secret; `None` or an empty secret fails with
/// [`SignatureError::MissingSecret`] since verification was requested without one.
/// The digest comparison is case-insensitive and constant-time.
pub fn verify(body: &[u8], header: Option<&str>, secret: Option<&str>) -> Result<(), SignatureError> {
    let secret = secret
        .filter(|s| !s.is_empty())
        .ok_or(SignatureError::MissingSecret)?;
    let header = header
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .ok_or(SignatureError::MissingHeader)?;

    let (encoding, digest) = parse_header(header)?;
    if !encoding.eq_ignore_ascii_case(SHA1_ENCODING) {
        return Err(SignatureError::UnsupportedEncoding(encoding.to_string()));
    }

    let expected = hex::decode(digest).map_err(|_| SignatureError::SignatureMismatch)?;
    let mut mac = new_mac(secret);
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| SignatureError::SignatureMismatch)
}

/// Split `<encoding>=<digest>`; exactly one `=` with non-empty sides.
fn parse_header(header: &str) -> Result<(&str, &str), SignatureError> {
    let malformed = || SignatureError::MalformedHeader(header.to_string());
    let (encoding, digest) = header.split_once('=').ok_or_else(malformed)?;
    if encoding.is_empty() || digest.is_empty() || digest.contains('=') {
        return Err(malformed());
    }
    Ok((encoding, digest))
}
