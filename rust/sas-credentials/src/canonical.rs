//! Strings-to-sign.
//!
//! The storage service recomputes these strings from the query parameters of
//! a presented token, so every field, its position and its formatting must
//! match byte for byte. Optional features this issuer never sets (stored
//! access policies, IP ranges, snapshots, encryption scopes, response header
//! overrides) still occupy their positions as empty fields.

use chrono::{DateTime, Utc};
use tracing::trace;

use crate::{AccountScope, DelegationKey, ResourceScope};

/// Storage service version the strings-to-sign are laid out for (`sv`).
pub const SAS_VERSION: &str = "2022-11-02";

/// Format of every timestamp in a token and its string-to-sign.
pub const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Render an instant the way tokens carry it.
pub fn format_time(time: DateTime<Utc>) -> String {
    time.format(TIME_FORMAT).to_string()
}

/// The exact payload handed to the signer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StringToSign(String);

impl StringToSign {
    fn from_fields(fields: &[&str]) -> Self {
        let payload = fields.join("\n");
        trace!(payload = %payload.escape_debug(), "Built string-to-sign");
        Self(payload)
    }

    /// The payload text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The payload bytes.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl std::fmt::Display for StringToSign {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl ResourceScope {
    /// `/blob/{account}/{container}[/{blob}]`, unencoded.
    pub fn canonical_resource(&self, account: &str) -> String {
        match self.blob_name() {
            Some(blob) => format!("/blob/{account}/{}/{blob}", self.container_name()),
            None => format!("/blob/{account}/{}", self.container_name()),
        }
    }

    /// The string-to-sign for a shared key signature.
    pub fn string_to_sign(&self, account: &str) -> StringToSign {
        let permissions = self.permissions().to_string();
        let start = format_time(self.window().start());
        let expiry = format_time(self.window().expiry());
        let resource = self.canonical_resource(account);

        StringToSign::from_fields(&[
            &permissions,
            &start,
            &expiry,
            &resource,
            "", // signed identifier
            "", // signed ip
            self.protocol().as_str(),
            SAS_VERSION,
            self.resource().as_str(),
            "", // snapshot time
            "", // encryption scope
            "", // rscc
            "", // rscd
            "", // rsce
            "", // rscl
            "", // rsct
        ])
    }

    /// The string-to-sign for a signature made with a user delegation key.
    pub fn delegated_string_to_sign(&self, account: &str, key: &DelegationKey) -> StringToSign {
        let permissions = self.permissions().to_string();
        let start = format_time(self.window().start());
        let expiry = format_time(self.window().expiry());
        let resource = self.canonical_resource(account);
        let key_start = format_time(key.signed_start());
        let key_expiry = format_time(key.signed_expiry());

        StringToSign::from_fields(&[
            &permissions,
            &start,
            &expiry,
            &resource,
            key.signed_oid(),
            key.signed_tid(),
            &key_start,
            &key_expiry,
            key.signed_service(),
            key.signed_version(),
            "", // authorized object id
            "", // unauthorized object id
            "", // correlation id
            "", // signed ip
            self.protocol().as_str(),
            SAS_VERSION,
            self.resource().as_str(),
            "", // snapshot time
            "", // encryption scope
            "", // rscc
            "", // rscd
            "", // rsce
            "", // rscl
            "", // rsct
        ])
    }
}

impl AccountScope {
    /// The string-to-sign for an account signature.
    ///
    /// Ends with the empty encryption scope followed by a newline.
    pub fn string_to_sign(&self, account: &str) -> StringToSign {
        let permissions = self.permissions().to_string();
        let services = self.services().to_string();
        let resource_types = self.resource_types().to_string();
        let start = format_time(self.window().start());
        let expiry = format_time(self.window().expiry());

        StringToSign::from_fields(&[
            account,
            &permissions,
            &services,
            &resource_types,
            &start,
            &expiry,
            "", // signed ip
            self.protocol().as_str(),
            SAS_VERSION,
            "", // encryption scope
            "",
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        AccountPermission, AccountPermissions, BlobPermission, Protocol, ResourceTypes, Service,
        TimeWindow,
    };
    use chrono::{TimeDelta, TimeZone};
    use pretty_assertions::assert_eq;

    fn window() -> TimeWindow {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        TimeWindow::starting_at(start, TimeDelta::hours(5)).unwrap()
    }

    #[test]
    fn it_lays_out_blob_scopes() {
        let scope = ResourceScope::blob("demo", "myfile.txt")
            .with_permission(BlobPermission::Read)
            .build(window())
            .unwrap();

        assert_eq!(
            scope.string_to_sign("acct").as_str(),
            "r\n2025-01-01T00:00:00Z\n2025-01-01T05:00:00Z\n/blob/acct/demo/myfile.txt\n\n\nhttps\n2022-11-02\nb\n\n\n\n\n\n\n"
        );
    }

    #[test]
    fn it_lays_out_container_scopes() {
        let scope = ResourceScope::container("demo")
            .with_permission(BlobPermission::List)
            .with_permission(BlobPermission::Read)
            .with_protocol(Protocol::HttpsOrHttp)
            .build(window())
            .unwrap();

        let payload = scope.string_to_sign("acct");
        let fields: Vec<&str> = payload.as_str().split('\n').collect();

        assert_eq!(fields.len(), 16);
        assert_eq!(fields[0], "rl");
        assert_eq!(fields[3], "/blob/acct/demo");
        assert_eq!(fields[6], "https,http");
        assert_eq!(fields[8], "c");
    }

    #[test]
    fn it_lays_out_account_scopes() {
        let scope = crate::AccountScope::new(Service::Blob.into(), ResourceTypes::all())
            .with_permissions(
                [AccountPermission::List, AccountPermission::Read]
                    .into_iter()
                    .collect::<AccountPermissions>(),
            )
            .build(window())
            .unwrap();

        assert_eq!(
            scope.string_to_sign("acct").as_str(),
            "acct\nrl\nb\nsco\n2025-01-01T00:00:00Z\n2025-01-01T05:00:00Z\n\nhttps\n2022-11-02\n\n"
        );
    }

    #[test]
    fn it_interleaves_delegation_key_fields() {
        let key_window = TimeWindow::starting_at(window().start(), TimeDelta::days(1)).unwrap();
        let key = DelegationKey::new(key_window, b"delegated".to_vec())
            .with_object_id("oid")
            .with_tenant_id("tid");
        let scope = ResourceScope::blob("demo", "myfile.txt")
            .with_permission(BlobPermission::Read)
            .build(window())
            .unwrap();

        let payload = scope.delegated_string_to_sign("acct", &key);
        let fields: Vec<&str> = payload.as_str().split('\n').collect();

        assert_eq!(fields.len(), 24);
        assert_eq!(&fields[3..10], &[
            "/blob/acct/demo/myfile.txt",
            "oid",
            "tid",
            "2025-01-01T00:00:00Z",
            "2025-01-02T00:00:00Z",
            "b",
            SAS_VERSION,
        ]);
        assert_eq!(fields[14], "https");
        assert_eq!(fields[16], "b");
    }

    #[test]
    fn it_is_deterministic_across_insertion_order() {
        let forward = ResourceScope::container("demo")
            .with_permission(BlobPermission::Read)
            .with_permission(BlobPermission::Write)
            .with_permission(BlobPermission::List)
            .build(window())
            .unwrap();
        let backward = ResourceScope::container("demo")
            .with_permission(BlobPermission::List)
            .with_permission(BlobPermission::Write)
            .with_permission(BlobPermission::Read)
            .build(window())
            .unwrap();

        assert_eq!(forward.string_to_sign("acct"), backward.string_to_sign("acct"));
    }
}
