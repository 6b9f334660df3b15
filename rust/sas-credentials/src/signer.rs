//! HMAC-SHA256 signatures over strings-to-sign.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::{DelegationKey, SharedKey, SigningError, StringToSign, TimeWindow};

/// The key a signature is made with.
#[derive(Debug, Clone, Copy)]
pub enum Signer<'a> {
    /// The account's shared key.
    SharedKey(&'a SharedKey),
    /// A user delegation key; the signed token must fall inside its window.
    UserDelegation(&'a DelegationKey),
}

impl Signer<'_> {
    /// Sign `payload` for a token valid over `window`.
    ///
    /// Fails without producing anything when the key or the payload is
    /// empty, or when a delegation key does not cover `window`.
    pub fn sign(
        &self,
        window: &TimeWindow,
        payload: &StringToSign,
    ) -> Result<Signature, SigningError> {
        let key = match self {
            Self::SharedKey(key) => key.as_bytes(),
            Self::UserDelegation(key) => key.value(),
        };

        if key.is_empty() {
            return Err(SigningError::EmptyKey);
        }
        if payload.as_str().is_empty() {
            return Err(SigningError::EmptyPayload);
        }
        if let Self::UserDelegation(key) = self {
            key.ensure_covers(window)?;
        }

        hmac_sha256(key, payload.as_bytes())
    }
}

/// A raw HMAC-SHA256 signature.
#[derive(Clone, PartialEq, Eq)]
pub struct Signature(Vec<u8>);

impl Signature {
    /// The raw MAC bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Renders as padded standard base64, the `sig` encoding.
impl std::fmt::Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&STANDARD.encode(&self.0))
    }
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Signature(<redacted>)")
    }
}

/// Compute HMAC-SHA256.
fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Signature, SigningError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key)
        .map_err(|error| SigningError::InvalidKey(error.to_string()))?;
    mac.update(data);
    Ok(Signature(mac.finalize().into_bytes().to_vec()))
}
