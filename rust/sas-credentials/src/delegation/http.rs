//! Fetching user delegation keys over HTTP.
//!
//! Implements the blob service's [Get User Delegation Key] operation:
//!
//! ```text
//! POST {blob endpoint}/?restype=service&comp=userdelegationkey
//! Authorization: Bearer {token}
//! x-ms-version: 2022-11-02
//!
//! <KeyInfo><Start>…</Start><Expiry>…</Expiry></KeyInfo>
//! ```
//!
//! [Get User Delegation Key]: https://learn.microsoft.com/rest/api/storageservices/get-user-delegation-key

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::account::{DEFAULT_ENDPOINT_SUFFIX, DEFAULT_PROTOCOL, default_endpoint};
use crate::canonical::format_time;
use crate::{
    AccountIdentity, AuthorityError, DelegationAuthority, DelegationKey, SAS_VERSION, Service,
    TimeWindow,
};

/// Supplies the bearer token presented to the authority.
///
/// How the token is obtained (client secret, managed identity, device code)
/// is up to the implementation.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait TokenSource: sas_common::ConditionalSync {
    /// A currently valid OAuth bearer token for the storage resource.
    async fn bearer_token(&self) -> Result<String, AuthorityError>;
}

/// A token obtained out of band.
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    /// Wrap a bearer token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StaticToken(<redacted>)")
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl TokenSource for StaticToken {
    async fn bearer_token(&self) -> Result<String, AuthorityError> {
        Ok(self.0.clone())
    }
}

/// Request body of Get User Delegation Key.
#[derive(Debug, Serialize)]
#[serde(rename = "KeyInfo")]
struct KeyInfo {
    #[serde(rename = "Start")]
    start: String,
    #[serde(rename = "Expiry")]
    expiry: String,
}

/// Response body of Get User Delegation Key.
#[derive(Debug, Deserialize)]
#[serde(rename = "UserDelegationKey")]
struct UserDelegationKey {
    #[serde(rename = "SignedOid")]
    signed_oid: String,
    #[serde(rename = "SignedTid")]
    signed_tid: String,
    #[serde(rename = "SignedStart")]
    signed_start: String,
    #[serde(rename = "SignedExpiry")]
    signed_expiry: String,
    #[serde(rename = "SignedService")]
    signed_service: String,
    #[serde(rename = "SignedVersion")]
    signed_version: String,
    #[serde(rename = "Value")]
    value: String,
}

/// Storage error response body.
#[derive(Debug, Deserialize)]
#[serde(rename = "Error")]
struct StorageError {
    #[serde(rename = "Code")]
    code: String,
    #[serde(rename = "Message")]
    message: Option<String>,
}

/// Requests user delegation keys from the blob service.
#[derive(Clone)]
pub struct HttpDelegationAuthority {
    client: reqwest::Client,
    tokens: Arc<dyn TokenSource>,
    endpoint: Option<Url>,
}

impl HttpDelegationAuthority {
    /// Authenticate with tokens from `tokens`, addressing
    /// `https://{account}.blob.core.windows.net`.
    pub fn new(tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            client: reqwest::Client::new(),
            tokens,
            endpoint: None,
        }
    }

    /// Authenticate with tokens from `tokens`, addressing the blob endpoint
    /// of `account`, which honors its `BlobEndpoint` and `EndpointSuffix`.
    pub fn for_account(tokens: Arc<dyn TokenSource>, account: &AccountIdentity) -> Self {
        Self::new(tokens).with_endpoint(account.blob_endpoint().clone())
    }

    /// Send every request to `endpoint` regardless of account, e.g. a local
    /// emulator or a sovereign cloud.
    pub fn with_endpoint(mut self, endpoint: Url) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// Use a preconfigured HTTP client.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    fn request_url(&self, account: &str) -> Result<Url, AuthorityError> {
        let mut url = match &self.endpoint {
            Some(endpoint) => endpoint.clone(),
            None => {
                default_endpoint(account, Service::Blob, DEFAULT_PROTOCOL, DEFAULT_ENDPOINT_SUFFIX)
                    .map_err(|error| AuthorityError::Denied(error.to_string()))?
            }
        };
        let path = format!("{}/", url.path().trim_end_matches('/'));
        url.set_path(&path);
        url.query_pairs_mut()
            .append_pair("restype", "service")
            .append_pair("comp", "userdelegationkey");
        Ok(url)
    }
}

impl std::fmt::Debug for HttpDelegationAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpDelegationAuthority")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl DelegationAuthority for HttpDelegationAuthority {
    async fn request_delegation_key(
        &self,
        account: &str,
        window: &TimeWindow,
    ) -> Result<DelegationKey, AuthorityError> {
        let url = self.request_url(account)?;
        let token = self.tokens.bearer_token().await?;
        let body = key_info_body(window)?;

        debug!(%url, "Sending user delegation key request");
        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .header("x-ms-version", SAS_VERSION)
            .header("Content-Type", "application/xml")
            .body(body)
            .send()
            .await
            .map_err(|error| AuthorityError::Unavailable(error.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|error| AuthorityError::Unavailable(error.to_string()))?;

        if !status.is_success() {
            return Err(classify(status, &text));
        }

        parse_user_delegation_key(&text)
    }
}

fn key_info_body(window: &TimeWindow) -> Result<String, AuthorityError> {
    let info = KeyInfo {
        start: format_time(window.start()),
        expiry: format_time(window.expiry()),
    };
    let xml = quick_xml::se::to_string(&info)
        .map_err(|error| AuthorityError::Denied(format!("cannot encode request: {error}")))?;
    Ok(format!("<?xml version=\"1.0\" encoding=\"utf-8\"?>{xml}"))
}

/// Decode a `UserDelegationKey` response body.
///
/// A body that cannot be decoded is reported as
/// [`AuthorityError::Unavailable`].
pub fn parse_user_delegation_key(body: &str) -> Result<DelegationKey, AuthorityError> {
    let unreadable =
        |reason: String| AuthorityError::Unavailable(format!("unreadable key: {reason}"));

    let key: UserDelegationKey =
        quick_xml::de::from_str(body).map_err(|error| unreadable(error.to_string()))?;
    let start = parse_time(&key.signed_start).map_err(unreadable)?;
    let expiry = parse_time(&key.signed_expiry).map_err(unreadable)?;
    let window = TimeWindow::new(start, expiry).map_err(|error| unreadable(error.to_string()))?;
    let value = STANDARD
        .decode(key.value.trim())
        .map_err(|error| unreadable(error.to_string()))?;

    Ok(DelegationKey::new(window, value)
        .with_object_id(key.signed_oid)
        .with_tenant_id(key.signed_tid)
        .with_service(key.signed_service)
        .with_version(key.signed_version))
}

fn parse_time(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|time| time.with_timezone(&Utc))
        .map_err(|error| format!("'{value}': {error}"))
}

/// Map a failed response onto the authority error taxonomy.
fn classify(status: StatusCode, body: &str) -> AuthorityError {
    let detail = match quick_xml::de::from_str::<StorageError>(body) {
        Ok(error) => format!(
            "{status}: {} {}",
            error.code,
            error.message.unwrap_or_default()
        ),
        Err(_) => status.to_string(),
    };
    let detail = detail.trim().to_string();

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AuthorityError::Denied(detail),
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            AuthorityError::Unavailable(detail)
        }
        status if status.is_server_error() => AuthorityError::Unavailable(detail),
        status if status.is_client_error() => AuthorityError::Denied(detail),
        _ => AuthorityError::Unavailable(detail),
    }
}
