//! Credential descriptor (connection string) parsing.
//!
//! A descriptor is a single secret string of `Key=Value` pairs separated by
//! `;`, as handed out by the storage account portal:
//!
//! ```text
//! DefaultEndpointsProtocol=https;AccountName=acct;AccountKey=a2V5;EndpointSuffix=core.windows.net
//! ```

use std::str::FromStr;

use indexmap::IndexMap;

use crate::DescriptorError;

/// Key holding the storage account name.
pub const ACCOUNT_NAME: &str = "AccountName";
/// Key holding the base64 encoded shared account key.
pub const ACCOUNT_KEY: &str = "AccountKey";
/// Key selecting the scheme of derived endpoints.
pub const DEFAULT_ENDPOINTS_PROTOCOL: &str = "DefaultEndpointsProtocol";
/// Key selecting the DNS suffix of derived endpoints.
pub const ENDPOINT_SUFFIX: &str = "EndpointSuffix";

/// The parsed key/value pairs of a credential descriptor, in source order.
///
/// Parsing only checks syntax; which keys must be present is decided by the
/// consumer through [`CredentialDescriptor::require`].
///
/// ```
/// use sas_credentials::CredentialDescriptor;
///
/// let descriptor = CredentialDescriptor::parse("AccountName=acct;AccountKey=a2V5;")?;
/// assert_eq!(descriptor.get("AccountName"), Some("acct"));
/// assert_eq!(descriptor.require("AccountKey")?, "a2V5");
/// # Ok::<(), sas_credentials::DescriptorError>(())
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialDescriptor {
    entries: IndexMap<String, String>,
}

impl CredentialDescriptor {
    /// Parse a descriptor string.
    ///
    /// Empty segments (e.g. a trailing `;`) are skipped. Each segment is split
    /// on its first `=` only, since values such as base64 keys may themselves
    /// contain `=`.
    pub fn parse(input: &str) -> Result<Self, DescriptorError> {
        let mut entries = IndexMap::new();

        for segment in input.split(';').filter(|segment| !segment.is_empty()) {
            let (key, value) =
                segment
                    .split_once('=')
                    .ok_or_else(|| DescriptorError::MissingSeparator {
                        segment: redact(segment),
                    })?;

            if key.is_empty() {
                return Err(DescriptorError::EmptyKey {
                    segment: redact(segment),
                });
            }

            if entries.insert(key.to_string(), value.to_string()).is_some() {
                return Err(DescriptorError::DuplicateKey {
                    key: key.to_string(),
                });
            }
        }

        Ok(Self { entries })
    }

    /// Look up a value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Look up a value that must be present.
    pub fn require(&self, key: &str) -> Result<&str, DescriptorError> {
        self.get(key).ok_or_else(|| DescriptorError::MissingKey {
            key: key.to_string(),
        })
    }

    /// Iterate over keys in source order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of pairs.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the descriptor has no pairs at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromStr for CredentialDescriptor {
    type Err = DescriptorError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        Self::parse(input)
    }
}

impl std::fmt::Debug for CredentialDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(key, value)| {
                if key == ACCOUNT_KEY {
                    (key.as_str(), "<redacted>")
                } else {
                    (key.as_str(), value.as_str())
                }
            }))
            .finish()
    }
}

/// Keep error messages from echoing secrets: only the key part of a segment
/// is reported.
fn redact(segment: &str) -> String {
    match segment.split_once('=') {
        Some((key, _)) => format!("{key}=…"),
        None if segment.chars().count() > 16 => {
            format!("{}…", segment.chars().take(16).collect::<String>())
        }
        None => segment.to_string(),
    }
}
