//! Storage account identity and key material.

use std::collections::BTreeMap;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use url::Url;

use crate::descriptor::{ACCOUNT_KEY, ACCOUNT_NAME, DEFAULT_ENDPOINTS_PROTOCOL, ENDPOINT_SUFFIX};
use crate::{CredentialDescriptor, DescriptorError, Letter, Service};

/// Protocol of derived endpoints when the descriptor names none.
pub const DEFAULT_PROTOCOL: &str = "https";
/// DNS suffix of derived endpoints when the descriptor names none.
pub const DEFAULT_ENDPOINT_SUFFIX: &str = "core.windows.net";

/// The raw shared account key.
///
/// The bytes never appear in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct SharedKey(Vec<u8>);

impl SharedKey {
    /// Wrap raw key bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Decode a base64 (standard alphabet) key as found in descriptors.
    pub fn from_base64(encoded: &str) -> Result<Self, DescriptorError> {
        STANDARD
            .decode(encoded)
            .map(Self)
            .map_err(|error| DescriptorError::InvalidValue {
                key: ACCOUNT_KEY.into(),
                reason: format!("not valid base64: {error}"),
            })
    }

    /// The raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Whether the key has no bytes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for SharedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SharedKey(<{} bytes redacted>)", self.0.len())
    }
}

/// A storage account: its name, shared key and service endpoints.
///
/// Immutable once built. Endpoints come from explicit `BlobEndpoint`,
/// `FileEndpoint`, `QueueEndpoint` and `TableEndpoint` entries when the
/// descriptor has them, otherwise they are derived as
/// `{DefaultEndpointsProtocol}://{AccountName}.{service}.{EndpointSuffix}`.
///
/// ```
/// use sas_credentials::{AccountIdentity, Service};
///
/// let account: AccountIdentity = "AccountName=acct;AccountKey=a2V5;".parse()?;
/// assert_eq!(account.name(), "acct");
/// assert_eq!(account.shared_key().as_bytes(), b"key");
/// assert_eq!(account.blob_endpoint().as_str(), "https://acct.blob.core.windows.net/");
/// assert_eq!(
///     account.endpoint(Service::Table).as_str(),
///     "https://acct.table.core.windows.net/"
/// );
/// # Ok::<(), sas_credentials::SasError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountIdentity {
    name: String,
    shared_key: SharedKey,
    endpoints: BTreeMap<Service, Url>,
}

impl AccountIdentity {
    /// Build an identity with default `https` endpoints under
    /// `core.windows.net`.
    pub fn new(name: impl Into<String>, shared_key: SharedKey) -> Result<Self, DescriptorError> {
        let name = name.into();
        if name.is_empty() {
            return Err(DescriptorError::InvalidValue {
                key: ACCOUNT_NAME.into(),
                reason: "must not be empty".into(),
            });
        }

        let mut endpoints = BTreeMap::new();
        for service in Service::ALL.iter().copied() {
            let url = default_endpoint(&name, service, DEFAULT_PROTOCOL, DEFAULT_ENDPOINT_SUFFIX)?;
            endpoints.insert(service, url);
        }

        Ok(Self {
            name,
            shared_key,
            endpoints,
        })
    }

    /// Extract an identity from a parsed descriptor.
    ///
    /// `AccountName` and `AccountKey` are required; `AccountKey` must be
    /// valid base64.
    pub fn from_descriptor(descriptor: &CredentialDescriptor) -> Result<Self, DescriptorError> {
        let name = descriptor.require(ACCOUNT_NAME)?;
        let shared_key = SharedKey::from_base64(descriptor.require(ACCOUNT_KEY)?)?;
        let protocol = descriptor
            .get(DEFAULT_ENDPOINTS_PROTOCOL)
            .unwrap_or(DEFAULT_PROTOCOL);
        let suffix = descriptor
            .get(ENDPOINT_SUFFIX)
            .unwrap_or(DEFAULT_ENDPOINT_SUFFIX);

        let mut identity = Self::new(name, shared_key)?;
        for service in Service::ALL.iter().copied() {
            let url = match descriptor.get(service.endpoint_key()) {
                Some(explicit) => parse_endpoint(service.endpoint_key(), explicit)?,
                None => default_endpoint(name, service, protocol, suffix)?,
            };
            identity.endpoints.insert(service, url);
        }

        Ok(identity)
    }

    /// Replace the endpoint of one service.
    pub fn with_endpoint(mut self, service: Service, endpoint: Url) -> Self {
        self.endpoints.insert(service, endpoint);
        self
    }

    /// The account name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The shared account key.
    pub fn shared_key(&self) -> &SharedKey {
        &self.shared_key
    }

    /// The blob service endpoint.
    pub fn blob_endpoint(&self) -> &Url {
        self.endpoint(Service::Blob)
    }

    /// The endpoint of `service`.
    pub fn endpoint(&self, service: Service) -> &Url {
        // Populated for every service on construction.
        &self.endpoints[&service]
    }
}

impl FromStr for AccountIdentity {
    type Err = DescriptorError;

    fn from_str(descriptor: &str) -> Result<Self, Self::Err> {
        Self::from_descriptor(&CredentialDescriptor::parse(descriptor)?)
    }
}

/// The conventional endpoint of `service` for `account`.
pub fn default_endpoint(
    account: &str,
    service: Service,
    protocol: &str,
    suffix: &str,
) -> Result<Url, DescriptorError> {
    let endpoint = format!("{protocol}://{account}.{}.{suffix}", service.host_label());
    Url::parse(&endpoint).map_err(|error| DescriptorError::InvalidValue {
        key: ACCOUNT_NAME.into(),
        reason: format!("cannot form endpoint '{endpoint}': {error}"),
    })
}

fn parse_endpoint(key: &str, value: &str) -> Result<Url, DescriptorError> {
    Url::parse(value).map_err(|error| DescriptorError::InvalidValue {
        key: key.into(),
        reason: error.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_extracts_name_and_key() {
        let account: AccountIdentity = "AccountName=acct;AccountKey=a2V5;".parse().unwrap();

        assert_eq!(account.name(), "acct");
        assert_eq!(account.shared_key().as_bytes(), b"key");
    }

    #[test]
    fn it_derives_endpoints_from_protocol_and_suffix() {
        let account: AccountIdentity =
            "DefaultEndpointsProtocol=http;AccountName=acct;AccountKey=a2V5;EndpointSuffix=core.chinacloudapi.cn"
                .parse()
                .unwrap();

        assert_eq!(
            account.blob_endpoint().as_str(),
            "http://acct.blob.core.chinacloudapi.cn/"
        );
        assert_eq!(
            account.endpoint(Service::Queue).as_str(),
            "http://acct.queue.core.chinacloudapi.cn/"
        );
    }

    #[test]
    fn it_prefers_explicit_endpoints() {
        let account: AccountIdentity =
            "AccountName=devstoreaccount1;AccountKey=a2V5;BlobEndpoint=http://127.0.0.1:10000/devstoreaccount1"
                .parse()
                .unwrap();

        assert_eq!(
            account.blob_endpoint().as_str(),
            "http://127.0.0.1:10000/devstoreaccount1"
        );
        assert_eq!(
            account.endpoint(Service::File).as_str(),
            "https://devstoreaccount1.file.core.windows.net/"
        );
    }

    #[test]
    fn it_requires_account_key() {
        let error = "AccountName=acct".parse::<AccountIdentity>().unwrap_err();
        assert_eq!(
            error,
            DescriptorError::MissingKey {
                key: "AccountKey".into()
            }
        );
    }

    #[test]
    fn it_requires_account_name() {
        let error = "AccountKey=a2V5".parse::<AccountIdentity>().unwrap_err();
        assert_eq!(
            error,
            DescriptorError::MissingKey {
                key: "AccountName".into()
            }
        );
    }

    #[test]
    fn it_rejects_keys_that_are_not_base64() {
        let error = "AccountName=acct;AccountKey=not base64!"
            .parse::<AccountIdentity>()
            .unwrap_err();
        assert!(matches!(
            error,
            DescriptorError::InvalidValue { ref key, .. } if key == "AccountKey"
        ));
    }

    #[test]
    fn it_rejects_malformed_explicit_endpoints() {
        let error = "AccountName=acct;AccountKey=a2V5;TableEndpoint=not a url"
            .parse::<AccountIdentity>()
            .unwrap_err();
        assert!(matches!(
            error,
            DescriptorError::InvalidValue { ref key, .. } if key == "TableEndpoint"
        ));
    }

    #[test]
    fn it_redacts_the_shared_key() {
        let account: AccountIdentity = "AccountName=acct;AccountKey=c2VjcmV0".parse().unwrap();
        let debug = format!("{account:?}");

        assert!(debug.contains("acct"));
        assert!(!debug.contains("secret"));
        assert!(!debug.contains("c2VjcmV0"));
    }
}
