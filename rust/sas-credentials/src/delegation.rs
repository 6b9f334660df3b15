//! User delegation keys.
//!
//! Instead of the account's shared key, tokens can be signed with a short
//! lived key handed out by the identity authority to an authenticated
//! principal:
//!
//! - [`DelegationKey`] - the key and the `sk*` fields it stamps on tokens
//! - [`DelegationAuthority`] - where keys come from
//! - [`DelegationKeyBroker`] - a per-account cache that fetches each key once
//!
//! With the `http` feature, [`HttpDelegationAuthority`] requests keys from
//! the blob service's `userdelegationkey` endpoint.

mod authority;
mod broker;
#[cfg(feature = "http")]
mod http;
mod key;

pub use authority::{AuthorityError, DelegationAuthority};
pub use broker::{DEFAULT_KEY_LIFETIME_SECONDS, DelegationKeyBroker, KeyStatus};
#[cfg(feature = "http")]
pub use http::{HttpDelegationAuthority, StaticToken, TokenSource, parse_user_delegation_key};
pub use key::DelegationKey;
