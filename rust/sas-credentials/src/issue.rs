//! Turning validated scopes into signed tokens.

use tracing::debug;

use crate::canonical::format_time;
use crate::{
    AccountIdentity, AccountScope, DelegationKey, ResourceScope, SAS_VERSION, SasError, SasScope,
    SignedToken, Signer, max_delegated_window,
};

impl ResourceScope {
    /// Sign with the account's shared key.
    ///
    /// ```
    /// use chrono::{TimeDelta, TimeZone, Utc};
    /// use sas_credentials::{AccountIdentity, BlobPermission, ResourceScope, TimeWindow};
    ///
    /// let account: AccountIdentity = "AccountName=acct;AccountKey=a2V5;".parse()?;
    /// let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    /// let token = ResourceScope::blob("demo", "myfile.txt")
    ///     .with_permission(BlobPermission::Read)
    ///     .build(TimeWindow::starting_at(start, TimeDelta::hours(5))?)?
    ///     .sign(&account)?;
    ///
    /// assert_eq!(token.get("sr"), Some("b"));
    /// assert_eq!(token.get("sp"), Some("r"));
    /// # Ok::<(), sas_credentials::SasError>(())
    /// ```
    pub fn sign(&self, account: &AccountIdentity) -> Result<SignedToken, SasError> {
        let payload = self.string_to_sign(account.name());
        let signature = Signer::SharedKey(account.shared_key()).sign(self.window(), &payload)?;

        debug!(
            account = account.name(),
            container = self.container_name(),
            blob = self.blob_name(),
            permissions = %self.permissions(),
            expiry = %self.window().expiry(),
            "Issued shared key SAS"
        );

        Ok(SignedToken::new([
            ("sv", SAS_VERSION.to_string()),
            ("spr", self.protocol().as_str().to_string()),
            ("st", format_time(self.window().start())),
            ("se", format_time(self.window().expiry())),
            ("sr", self.resource().as_str().to_string()),
            ("sp", self.permissions().to_string()),
            ("sig", signature.to_string()),
        ]))
    }

    /// Sign with a user delegation key.
    ///
    /// The scope window must not exceed seven days and must lie inside the
    /// key's window.
    pub fn sign_with_delegation_key(
        &self,
        account: &AccountIdentity,
        key: &DelegationKey,
    ) -> Result<SignedToken, SasError> {
        self.window().ensure_at_most(max_delegated_window())?;
        let payload = self.delegated_string_to_sign(account.name(), key);
        let signature = Signer::UserDelegation(key).sign(self.window(), &payload)?;

        debug!(
            account = account.name(),
            container = self.container_name(),
            blob = self.blob_name(),
            permissions = %self.permissions(),
            expiry = %self.window().expiry(),
            key_expiry = %key.signed_expiry(),
            "Issued user delegation SAS"
        );

        Ok(SignedToken::new([
            ("sv", SAS_VERSION.to_string()),
            ("spr", self.protocol().as_str().to_string()),
            ("st", format_time(self.window().start())),
            ("se", format_time(self.window().expiry())),
            ("skoid", key.signed_oid().to_string()),
            ("sktid", key.signed_tid().to_string()),
            ("skt", format_time(key.signed_start())),
            ("ske", format_time(key.signed_expiry())),
            ("sks", key.signed_service().to_string()),
            ("skv", key.signed_version().to_string()),
            ("sr", self.resource().as_str().to_string()),
            ("sp", self.permissions().to_string()),
            ("sig", signature.to_string()),
        ]))
    }
}

impl AccountScope {
    /// Sign with the account's shared key.
    pub fn sign(&self, account: &AccountIdentity) -> Result<SignedToken, SasError> {
        let payload = self.string_to_sign(account.name());
        let signature = Signer::SharedKey(account.shared_key()).sign(self.window(), &payload)?;

        debug!(
            account = account.name(),
            services = %self.services(),
            resource_types = %self.resource_types(),
            permissions = %self.permissions(),
            expiry = %self.window().expiry(),
            "Issued account SAS"
        );

        Ok(SignedToken::new([
            ("sv", SAS_VERSION.to_string()),
            ("ss", self.services().to_string()),
            ("srt", self.resource_types().to_string()),
            ("spr", self.protocol().as_str().to_string()),
            ("st", format_time(self.window().start())),
            ("se", format_time(self.window().expiry())),
            ("sp", self.permissions().to_string()),
            ("sig", signature.to_string()),
        ]))
    }
}

impl SasScope {
    /// Sign either kind of scope with the account's shared key.
    pub fn sign(&self, account: &AccountIdentity) -> Result<SignedToken, SasError> {
        match self {
            Self::Account(scope) => scope.sign(account),
            Self::Resource(scope) => scope.sign(account),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BlobPermission, ScopeError, SigningError, TimeWindow};
    use chrono::{DateTime, TimeDelta, TimeZone, Utc};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    fn account() -> AccountIdentity {
        "AccountName=acct;AccountKey=a2V5;".parse().unwrap()
    }

    fn scope(lifetime: TimeDelta) -> ResourceScope {
        ResourceScope::blob("demo", "myfile.txt")
            .with_permission(BlobPermission::Read)
            .build(TimeWindow::starting_at(start(), lifetime).unwrap())
            .unwrap()
    }

    #[test]
    fn it_emits_resource_parameters_in_order() {
        let token = scope(TimeDelta::hours(5)).sign(&account()).unwrap();

        assert_eq!(
            token.parameters().map(|(name, _)| name).collect::<Vec<_>>(),
            vec!["sv", "spr", "st", "se", "sr", "sp", "sig"]
        );
    }

    #[test]
    fn it_emits_delegation_parameters_in_order() {
        let key = DelegationKey::new(
            TimeWindow::starting_at(start(), TimeDelta::days(1)).unwrap(),
            b"delegated".to_vec(),
        );
        let token = scope(TimeDelta::hours(5))
            .sign_with_delegation_key(&account(), &key)
            .unwrap();

        assert_eq!(
            token.parameters().map(|(name, _)| name).collect::<Vec<_>>(),
            vec![
                "sv", "spr", "st", "se", "skoid", "sktid", "skt", "ske", "sks", "skv", "sr", "sp",
                "sig"
            ]
        );
    }

    #[test]
    fn it_rejects_delegated_scopes_over_a_week() {
        let key = DelegationKey::new(
            TimeWindow::starting_at(start(), TimeDelta::days(30)).unwrap(),
            b"delegated".to_vec(),
        );
        let error = scope(TimeDelta::days(8))
            .sign_with_delegation_key(&account(), &key)
            .unwrap_err();

        assert!(matches!(
            error,
            SasError::InvalidScope(ScopeError::WindowTooLong { .. })
        ));
    }

    #[test]
    fn it_rejects_delegated_scopes_outside_the_key_window() {
        let key = DelegationKey::new(
            TimeWindow::starting_at(start(), TimeDelta::minutes(5)).unwrap(),
            b"delegated".to_vec(),
        );
        let error = scope(TimeDelta::hours(5))
            .sign_with_delegation_key(&account(), &key)
            .unwrap_err();

        assert!(matches!(
            error,
            SasError::Signing(SigningError::WindowNotCovered { .. })
        ));
    }

    #[test]
    fn it_signs_both_scope_kinds_through_the_umbrella_type() {
        let resource: SasScope = scope(TimeDelta::hours(1)).into();
        assert!(resource.sign(&account()).unwrap().signature().is_some());
    }
}
