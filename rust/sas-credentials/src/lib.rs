#![warn(missing_docs)]

//! Shared access signature issuance for blob storage accounts.
//!
//! This crate mints scoped, time-bounded, HMAC-SHA256 signed tokens that
//! grant bearer access to a storage account, a container or a single blob.
//! The storage service validates them offline; nothing here talks to it
//! except the optional delegation key transport.
//!
//! It works on both native and WebAssembly targets.
//!
//! # Signing Keys
//!
//! - [`SharedKey`] - the account key from the connection string
//! - [`DelegationKey`] - a short lived key from the identity authority,
//!   cached per account by [`DelegationKeyBroker`]
//!
//! # Example
//!
//! ```
//! use chrono::{TimeDelta, Utc};
//! use sas_credentials::{
//!     AccountIdentity, AccountPermission, AccountScope, ResourceTypes, Service, TimeWindow,
//! };
//!
//! # fn example() -> Result<(), sas_credentials::SasError> {
//! let account: AccountIdentity =
//!     "DefaultEndpointsProtocol=https;AccountName=acct;AccountKey=a2V5;".parse()?;
//!
//! // Read and list everything in the blob service for ten hours
//! let scope = AccountScope::new(Service::Blob.into(), ResourceTypes::all())
//!     .with_permissions(
//!         [AccountPermission::Read, AccountPermission::List]
//!             .into_iter()
//!             .collect(),
//!     )
//!     .build(TimeWindow::starting_at(Utc::now(), TimeDelta::hours(10))?)?;
//!
//! let uri = account.account_sas_uri(&scope, Service::Blob)?;
//! println!("Account SAS: {uri}");
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

mod account;
mod assembler;
pub mod canonical;
pub mod delegation;
pub mod descriptor;
mod error;
mod issue;
mod permission;
mod scope;
mod signer;
pub mod token;

pub use account::{
    AccountIdentity, DEFAULT_ENDPOINT_SUFFIX, DEFAULT_PROTOCOL, SharedKey, default_endpoint,
};
pub use assembler::{ConnectionString, resource_uri, service_uri};
pub use canonical::{SAS_VERSION, StringToSign};
pub use delegation::{
    AuthorityError, DelegationAuthority, DelegationKey, DelegationKeyBroker, KeyStatus,
};
pub use descriptor::CredentialDescriptor;
pub use error::{DescriptorError, SasError, ScopeError, SigningError, TokenError};
pub use permission::{
    AccountPermission, AccountPermissions, BlobPermission, BlobPermissions, Letter, LetterSet,
    ResourceType, ResourceTypes, Service, Services,
};
pub use scope::{
    AccountScope, AccountScopeBuilder, MAX_DELEGATED_WINDOW_SECONDS, Protocol, ResourceScope,
    ResourceScopeBuilder, SasScope, SignedResource, TimeWindow, WindowPolicy,
    max_delegated_window,
};
pub use signer::{Signature, Signer};
pub use token::SignedToken;
