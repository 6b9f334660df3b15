use chrono::{DateTime, Utc};

use crate::{SAS_VERSION, SigningError, TimeWindow};

/// A short-lived signing key issued by the identity authority.
///
/// Tokens signed with it carry its `sk*` fields and must lie inside its
/// window. The key bytes never appear in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct DelegationKey {
    signed_oid: String,
    signed_tid: String,
    window: TimeWindow,
    signed_service: String,
    signed_version: String,
    value: Vec<u8>,
}

impl DelegationKey {
    /// A blob service key valid over `window`.
    pub fn new(window: TimeWindow, value: Vec<u8>) -> Self {
        Self {
            signed_oid: String::new(),
            signed_tid: String::new(),
            window,
            signed_service: "b".into(),
            signed_version: SAS_VERSION.into(),
            value,
        }
    }

    /// Set the object id of the principal the key was issued to.
    pub fn with_object_id(mut self, oid: impl Into<String>) -> Self {
        self.signed_oid = oid.into();
        self
    }

    /// Set the tenant of the principal the key was issued to.
    pub fn with_tenant_id(mut self, tid: impl Into<String>) -> Self {
        self.signed_tid = tid.into();
        self
    }

    /// Set the service the key is valid for.
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.signed_service = service.into();
        self
    }

    /// Set the service version that issued the key.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.signed_version = version.into();
        self
    }

    /// `skoid`.
    pub fn signed_oid(&self) -> &str {
        &self.signed_oid
    }

    /// `sktid`.
    pub fn signed_tid(&self) -> &str {
        &self.signed_tid
    }

    /// `skt`.
    pub fn signed_start(&self) -> DateTime<Utc> {
        self.window.start()
    }

    /// `ske`.
    pub fn signed_expiry(&self) -> DateTime<Utc> {
        self.window.expiry()
    }

    /// `sks`.
    pub fn signed_service(&self) -> &str {
        &self.signed_service
    }

    /// `skv`.
    pub fn signed_version(&self) -> &str {
        &self.signed_version
    }

    /// The validity window of the key.
    pub fn window(&self) -> &TimeWindow {
        &self.window
    }

    /// The raw key bytes.
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Whether the key is no longer usable at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.signed_expiry()
    }

    /// Whether a token over `window` may be signed with this key.
    pub fn covers(&self, window: &TimeWindow) -> bool {
        self.window.contains(window)
    }

    /// Fail unless the key covers `window`.
    pub fn ensure_covers(&self, window: &TimeWindow) -> Result<(), SigningError> {
        if self.covers(window) {
            Ok(())
        } else {
            Err(SigningError::WindowNotCovered {
                token_start: window.start(),
                token_expiry: window.expiry(),
                key_start: self.signed_start(),
                key_expiry: self.signed_expiry(),
            })
        }
    }
}

impl std::fmt::Debug for DelegationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelegationKey")
            .field("signed_oid", &self.signed_oid)
            .field("signed_tid", &self.signed_tid)
            .field("signed_start", &self.signed_start())
            .field("signed_expiry", &self.signed_expiry())
            .field("signed_service", &self.signed_service)
            .field("signed_version", &self.signed_version)
            .field("value", &"<redacted>")
            .finish()
    }
}
