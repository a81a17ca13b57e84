//! PKCE (Proof Key for Code Exchange, RFC 7636) for the OAuth authorization-code flow.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use sha2::{Digest, Sha256};
use url::Url;

use crate::{Error, Result};

/// Random bytes behind a code verifier (hex-encoded to 128 characters).
const VERIFIER_BYTES: usize = 64;

/// Random bytes behind a state nonce (hex-encoded to 64 characters).
const STATE_BYTES: usize = 32;

/// The only challenge method we issue.
pub const CHALLENGE_METHOD: &str = "S256";

/// One pending authorization attempt: state nonce plus verifier/challenge pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PkceChallenge {
    pub state: String,
    pub verifier: String,
    pub challenge: String,
}

impl PkceChallenge {
    /// Generate a fresh state nonce and code verifier, and derive the challenge.
    pub fn generate() -> Self {
        let verifier = random_hex(VERIFIER_BYTES);
        let challenge = code_challenge(&verifier);
        Self {
            state: random_hex(STATE_BYTES),
            verifier,
            challenge,
        }
    }
}

/// S256 code challenge: base64url(SHA-256(verifier)), no padding.
pub fn code_challenge(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Build the provider's authorize URL for a pending flow.
pub fn authorization_url(
    provider_base: &str,
    client_id: &str,
    redirect_uri: &str,
    scope: &str,
    pkce: &PkceChallenge,
) -> Result<Url> {
    let mut url = Url::parse(provider_base)
        .and_then(|base| base.join("/oauth/authorize"))
        .map_err(|e| Error::Config(format!("invalid provider URL {provider_base}: {e}")))?;

    url.query_pairs_mut()
        .append_pair("client_id", client_id)
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("response_type", "code")
        .append_pair("state", &pkce.state)
        .append_pair("scope", scope)
        .append_pair("code_challenge", &pkce.challenge)
        .append_pair("code_challenge_method", CHALLENGE_METHOD);

    Ok(url)
}
