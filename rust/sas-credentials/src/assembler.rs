//! Authorized URIs and connection strings.

use std::collections::BTreeMap;
use std::fmt;

use url::Url;

use crate::token::{percent_encode, percent_encode_path};
use crate::{
    AccountIdentity, AccountScope, DelegationKey, Letter, ResourceScope, SasError, ScopeError,
    Service, SignedToken,
};

/// Address `container` (and `blob`, when given) under `endpoint`, carrying
/// `token` as its query.
///
/// Names are percent-encoded per path segment; `/` inside blob names is
/// kept as a separator.
pub fn resource_uri(
    endpoint: &Url,
    container: &str,
    blob: Option<&str>,
    token: &SignedToken,
) -> Url {
    let base = endpoint.path().trim_end_matches('/');
    let path = match blob {
        Some(blob) => format!(
            "{base}/{}/{}",
            percent_encode(container),
            percent_encode_path(blob)
        ),
        None => format!("{base}/{}", percent_encode(container)),
    };

    let mut url = endpoint.clone();
    url.set_path(&path);
    url.set_query(Some(&token.query()));
    url
}

/// `endpoint` carrying `token` as its query.
pub fn service_uri(endpoint: &Url, token: &SignedToken) -> Url {
    let mut url = endpoint.clone();
    url.set_query(Some(&token.query()));
    url
}

/// A connection string granting the services of an account SAS.
///
/// Renders as `BlobEndpoint=…;TableEndpoint=…;SharedAccessSignature=…`,
/// listing only the granted services, in canonical service order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionString {
    endpoints: BTreeMap<Service, Url>,
    token: SignedToken,
}

impl ConnectionString {
    /// Combine service endpoints with an account token.
    pub fn new(endpoints: impl IntoIterator<Item = (Service, Url)>, token: SignedToken) -> Self {
        Self {
            endpoints: endpoints.into_iter().collect(),
            token,
        }
    }

    /// The endpoint listed for `service`.
    pub fn endpoint(&self, service: Service) -> Option<&Url> {
        self.endpoints.get(&service)
    }

    /// The token shared by every listed endpoint.
    pub fn token(&self) -> &SignedToken {
        &self.token
    }
}

impl fmt::Display for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (service, endpoint) in &self.endpoints {
            write!(
                f,
                "{}={};",
                service.endpoint_key(),
                endpoint.as_str().trim_end_matches('/')
            )?;
        }
        write!(f, "SharedAccessSignature={}", self.token)
    }
}

impl AccountIdentity {
    /// Address `scope`'s container or blob with an already issued `token`.
    pub fn resource_uri(&self, scope: &ResourceScope, token: &SignedToken) -> Url {
        resource_uri(
            self.blob_endpoint(),
            scope.container_name(),
            scope.blob_name(),
            token,
        )
    }

    /// Sign `scope` with the shared key and address it.
    ///
    /// ```
    /// use chrono::{TimeDelta, TimeZone, Utc};
    /// use sas_credentials::{AccountIdentity, BlobPermission, ResourceScope, TimeWindow};
    ///
    /// let account: AccountIdentity = "AccountName=acct;AccountKey=a2V5;".parse()?;
    /// let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    /// let scope = ResourceScope::blob("demo", "myfile.txt")
    ///     .with_permission(BlobPermission::Read)
    ///     .build(TimeWindow::starting_at(start, TimeDelta::hours(5))?)?;
    ///
    /// let uri = account.resource_sas_uri(&scope)?;
    /// assert!(uri.as_str().starts_with("https://acct.blob.core.windows.net/demo/myfile.txt?sv="));
    /// # Ok::<(), sas_credentials::SasError>(())
    /// ```
    pub fn resource_sas_uri(&self, scope: &ResourceScope) -> Result<Url, SasError> {
        let token = scope.sign(self)?;
        Ok(self.resource_uri(scope, &token))
    }

    /// Sign `scope` with a delegation key and address it.
    pub fn delegated_sas_uri(
        &self,
        scope: &ResourceScope,
        key: &DelegationKey,
    ) -> Result<Url, SasError> {
        let token = scope.sign_with_delegation_key(self, key)?;
        Ok(self.resource_uri(scope, &token))
    }

    /// Sign `scope` and attach it to the endpoint of `service`.
    pub fn account_sas_uri(&self, scope: &AccountScope, service: Service) -> Result<Url, SasError> {
        if !scope.services().contains(service) {
            return Err(ScopeError::InvalidName {
                field: "service",
                value: service.letter().to_string(),
                reason: "not granted by the account scope",
            }
            .into());
        }
        let token = scope.sign(self)?;
        Ok(service_uri(self.endpoint(service), &token))
    }

    /// Sign `scope` and list the endpoints of its services alongside the
    /// token.
    pub fn connection_string(&self, scope: &AccountScope) -> Result<ConnectionString, SasError> {
        let token = scope.sign(self)?;
        let endpoints = scope
            .services()
            .iter()
            .map(|service| (service, self.endpoint(service).clone()));
        Ok(ConnectionString::new(endpoints, token))
    }
}
