//! Access scopes: what a token grants, over which window, and how.

use chrono::{DateTime, SubsecRound, TimeDelta, Utc};

use crate::{
    AccountPermissions, BlobPermission, BlobPermissions, Letter, ResourceTypes, ScopeError,
    Services,
};

/// Longest window a user delegation key, or a token it signs, may span.
pub const MAX_DELEGATED_WINDOW_SECONDS: i64 = 7 * 24 * 60 * 60;

/// Longest window a user delegation key, or a token it signs, may span.
pub fn max_delegated_window() -> TimeDelta {
    TimeDelta::seconds(MAX_DELEGATED_WINDOW_SECONDS)
}

/// A validity window `[start, expiry)` with whole-second precision.
///
/// Construction truncates both ends to whole seconds, so the instants that
/// are compared are exactly the ones that get serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeWindow {
    start: DateTime<Utc>,
    expiry: DateTime<Utc>,
}

impl TimeWindow {
    /// Build a window, failing unless `expiry` is later than `start`.
    pub fn new(start: DateTime<Utc>, expiry: DateTime<Utc>) -> Result<Self, ScopeError> {
        let start = start.trunc_subsecs(0);
        let expiry = expiry.trunc_subsecs(0);

        if expiry <= start {
            return Err(ScopeError::InvertedWindow { start, expiry });
        }

        Ok(Self { start, expiry })
    }

    /// A window of `lifetime` beginning at `start`.
    pub fn starting_at(start: DateTime<Utc>, lifetime: TimeDelta) -> Result<Self, ScopeError> {
        Self::new(start, start + lifetime)
    }

    /// First instant of validity.
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// First instant of invalidity.
    pub fn expiry(&self) -> DateTime<Utc> {
        self.expiry
    }

    /// Length of the window.
    pub fn duration(&self) -> TimeDelta {
        self.expiry - self.start
    }

    /// Whether `other` lies entirely inside this window.
    pub fn contains(&self, other: &TimeWindow) -> bool {
        self.start <= other.start && other.expiry <= self.expiry
    }

    /// Fail when the window is longer than `maximum`.
    pub fn ensure_at_most(&self, maximum: TimeDelta) -> Result<(), ScopeError> {
        let actual = self.duration();
        if actual > maximum {
            return Err(ScopeError::WindowTooLong { actual, maximum });
        }
        Ok(())
    }
}

/// How windows are derived from the current time.
///
/// `backdate` moves the start into the past to tolerate clock skew between
/// issuer and service; `maximum` optionally caps the window length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPolicy {
    backdate: TimeDelta,
    maximum: Option<TimeDelta>,
}

impl WindowPolicy {
    /// No backdating and no cap.
    pub fn new() -> Self {
        Self {
            backdate: TimeDelta::zero(),
            maximum: None,
        }
    }

    /// Start windows `backdate` before now.
    pub fn with_backdate(mut self, backdate: TimeDelta) -> Self {
        self.backdate = backdate;
        self
    }

    /// Reject windows longer than `maximum`.
    pub fn with_maximum(mut self, maximum: TimeDelta) -> Self {
        self.maximum = Some(maximum);
        self
    }

    /// How far starts are moved into the past.
    pub fn backdate(&self) -> TimeDelta {
        self.backdate
    }

    /// The longest window allowed, if capped.
    pub fn maximum(&self) -> Option<TimeDelta> {
        self.maximum
    }

    /// The window `[now - backdate, now + lifetime]`.
    pub fn window(
        &self,
        now: DateTime<Utc>,
        lifetime: TimeDelta,
    ) -> Result<TimeWindow, ScopeError> {
        let window = TimeWindow::new(now - self.backdate, now + lifetime)?;
        if let Some(maximum) = self.maximum {
            window.ensure_at_most(maximum)?;
        }
        Ok(window)
    }
}

impl Default for WindowPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// Which transports a token may be presented over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Protocol {
    /// HTTPS only.
    #[default]
    HttpsOnly,
    /// HTTPS or plain HTTP.
    HttpsOrHttp,
}

impl Protocol {
    /// The `spr` value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HttpsOnly => "https",
            Self::HttpsOrHttp => "https,http",
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kind of resource a resource scoped token addresses (`sr`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignedResource {
    /// A single blob.
    Blob,
    /// A container and the blobs in it.
    Container,
}

impl SignedResource {
    /// The `sr` value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blob => "b",
            Self::Container => "c",
        }
    }
}

/// Access to one container or one blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceScope {
    container: String,
    blob: Option<String>,
    permissions: BlobPermissions,
    window: TimeWindow,
    protocol: Protocol,
}

impl ResourceScope {
    /// Start describing access to `blob` inside `container`.
    pub fn blob(container: impl Into<String>, blob: impl Into<String>) -> ResourceScopeBuilder {
        ResourceScopeBuilder {
            container: container.into(),
            blob: Some(blob.into()),
            permissions: BlobPermissions::new(),
            protocol: Protocol::default(),
        }
    }

    /// Start describing access to a whole container.
    pub fn container(container: impl Into<String>) -> ResourceScopeBuilder {
        ResourceScopeBuilder {
            container: container.into(),
            blob: None,
            permissions: BlobPermissions::new(),
            protocol: Protocol::default(),
        }
    }

    /// The container name.
    pub fn container_name(&self) -> &str {
        &self.container
    }

    /// The blob name, for object scopes.
    pub fn blob_name(&self) -> Option<&str> {
        self.blob.as_deref()
    }

    /// Whether the scope addresses a blob or a container.
    pub fn resource(&self) -> SignedResource {
        match self.blob {
            Some(_) => SignedResource::Blob,
            None => SignedResource::Container,
        }
    }

    /// Granted permissions.
    pub fn permissions(&self) -> &BlobPermissions {
        &self.permissions
    }

    /// Validity window.
    pub fn window(&self) -> &TimeWindow {
        &self.window
    }

    /// Allowed transports.
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }
}

/// Builder for [`ResourceScope`].
///
/// ```
/// use chrono::{TimeDelta, TimeZone, Utc};
/// use sas_credentials::{BlobPermission, ResourceScope, SignedResource, TimeWindow};
///
/// let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
/// let scope = ResourceScope::blob("demo", "myfile.txt")
///     .with_permission(BlobPermission::Read)
///     .build(TimeWindow::starting_at(start, TimeDelta::hours(5))?)?;
///
/// assert_eq!(scope.resource(), SignedResource::Blob);
/// # Ok::<(), sas_credentials::ScopeError>(())
/// ```
#[derive(Debug, Clone)]
pub struct ResourceScopeBuilder {
    container: String,
    blob: Option<String>,
    permissions: BlobPermissions,
    protocol: Protocol,
}

impl ResourceScopeBuilder {
    /// Grant one more permission.
    pub fn with_permission(mut self, permission: BlobPermission) -> Self {
        self.permissions.insert(permission);
        self
    }

    /// Grant a set of permissions, replacing earlier ones.
    pub fn with_permissions(mut self, permissions: BlobPermissions) -> Self {
        self.permissions = permissions;
        self
    }

    /// Restrict transports.
    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Validate and build the scope.
    pub fn build(self, window: TimeWindow) -> Result<ResourceScope, ScopeError> {
        validate_container(&self.container)?;

        if let Some(blob) = &self.blob {
            validate_blob(blob)?;
            if let Some(permission) = self.permissions.iter().find(|p| p.is_container_only()) {
                return Err(ScopeError::IllegalPermission {
                    letter: permission.letter(),
                    scope: "blob permission on an object scope",
                    alphabet: "racwdxytmeopi",
                });
            }
        }

        if self.permissions.is_empty() {
            return Err(ScopeError::Empty {
                field: "permissions",
            });
        }

        Ok(ResourceScope {
            container: self.container,
            blob: self.blob,
            permissions: self.permissions,
            window,
            protocol: self.protocol,
        })
    }
}

fn validate_container(container: &str) -> Result<(), ScopeError> {
    if container.is_empty() {
        return Err(ScopeError::Empty { field: "container" });
    }
    if container.contains('/') {
        return Err(ScopeError::InvalidName {
            field: "container",
            value: container.into(),
            reason: "must not contain '/'",
        });
    }
    Ok(())
}

fn validate_blob(blob: &str) -> Result<(), ScopeError> {
    if blob.is_empty() {
        return Err(ScopeError::Empty { field: "blob" });
    }
    if blob.starts_with('/') {
        return Err(ScopeError::InvalidName {
            field: "blob",
            value: blob.into(),
            reason: "must not start with '/'",
        });
    }
    Ok(())
}

/// Access to whole services of an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountScope {
    services: Services,
    resource_types: ResourceTypes,
    permissions: AccountPermissions,
    window: TimeWindow,
    protocol: Protocol,
}

impl AccountScope {
    /// Start describing account access over `services` and
    /// `resource_types`.
    pub fn new(services: Services, resource_types: ResourceTypes) -> AccountScopeBuilder {
        AccountScopeBuilder {
            services,
            resource_types,
            permissions: AccountPermissions::new(),
            protocol: Protocol::default(),
        }
    }

    /// Granted services.
    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Granted resource types.
    pub fn resource_types(&self) -> &ResourceTypes {
        &self.resource_types
    }

    /// Granted permissions.
    pub fn permissions(&self) -> &AccountPermissions {
        &self.permissions
    }

    /// Validity window.
    pub fn window(&self) -> &TimeWindow {
        &self.window
    }

    /// Allowed transports.
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }
}

/// Builder for [`AccountScope`].
#[derive(Debug, Clone)]
pub struct AccountScopeBuilder {
    services: Services,
    resource_types: ResourceTypes,
    permissions: AccountPermissions,
    protocol: Protocol,
}

impl AccountScopeBuilder {
    /// Grant a set of permissions, replacing earlier ones.
    pub fn with_permissions(mut self, permissions: AccountPermissions) -> Self {
        self.permissions = permissions;
        self
    }

    /// Restrict transports.
    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Validate and build the scope.
    pub fn build(self, window: TimeWindow) -> Result<AccountScope, ScopeError> {
        if self.services.is_empty() {
            return Err(ScopeError::Empty { field: "services" });
        }
        if self.resource_types.is_empty() {
            return Err(ScopeError::Empty {
                field: "resource types",
            });
        }
        if self.permissions.is_empty() {
            return Err(ScopeError::Empty {
                field: "permissions",
            });
        }

        Ok(AccountScope {
            services: self.services,
            resource_types: self.resource_types,
            permissions: self.permissions,
            window,
            protocol: self.protocol,
        })
    }
}

/// Either kind of scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SasScope {
    /// Account wide access.
    Account(AccountScope),
    /// Container or blob access.
    Resource(ResourceScope),
}

impl SasScope {
    /// Validity window of the scope.
    pub fn window(&self) -> &TimeWindow {
        match self {
            Self::Account(scope) => scope.window(),
            Self::Resource(scope) => scope.window(),
        }
    }
}

impl From<AccountScope> for SasScope {
    fn from(scope: AccountScope) -> Self {
        Self::Account(scope)
    }
}

impl From<ResourceScope> for SasScope {
    fn from(scope: ResourceScope) -> Self {
        Self::Resource(scope)
    }
}
