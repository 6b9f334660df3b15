use async_trait::async_trait;
use thiserror::Error;

use crate::{DelegationKey, TimeWindow};

/// The identity authority could not supply a delegation key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthorityError {
    /// The authority could not be reached or did not answer usefully.
    /// Retrying later may succeed.
    #[error("delegation authority unavailable: {0}")]
    Unavailable(String),
    /// The authority refused the request. Retrying will not help.
    #[error("delegation authority denied the request: {0}")]
    Denied(String),
}

impl AuthorityError {
    /// Whether retrying the same request later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Anything that can issue user delegation keys for a storage account.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait DelegationAuthority: sas_common::ConditionalSync {
    /// Request a key for `account` valid over `window`.
    async fn request_delegation_key(
        &self,
        account: &str,
        window: &TimeWindow,
    ) -> Result<DelegationKey, AuthorityError>;
}
