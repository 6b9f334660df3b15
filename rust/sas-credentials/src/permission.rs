//! Letter alphabets: permissions, services and resource types.
//!
//! Every set in a SAS is serialized as a run of single-letter codes, and the
//! validating service rebuilds the string-to-sign with the letters in one
//! fixed order. [`LetterSet`] therefore stores its members ordered by their
//! canonical position (the declaration order below), never by insertion.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::ScopeError;

/// A member of a SAS letter alphabet.
pub trait Letter: Copy + Ord + std::hash::Hash + fmt::Debug + 'static {
    /// Every member, in canonical order.
    const ALL: &'static [Self];
    /// The letters of [`Letter::ALL`], concatenated.
    const ALPHABET: &'static str;
    /// What a member is called in error messages.
    const NAME: &'static str;

    /// The single-letter code of this member.
    fn letter(self) -> char;

    /// Look up a member by its code.
    fn from_letter(letter: char) -> Option<Self> {
        Self::ALL.iter().copied().find(|member| member.letter() == letter)
    }
}

macro_rules! alphabet {
    (
        $(#[$outer:meta])*
        pub enum $name:ident ($label:literal) {
            $( $(#[$inner:meta])* $variant:ident = $letter:literal ),+ $(,)?
        }
    ) => {
        $(#[$outer])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum $name {
            $( $(#[$inner])* $variant ),+
        }

        impl Letter for $name {
            const ALL: &'static [Self] = &[$(Self::$variant),+];
            const ALPHABET: &'static str = concat!($($letter),+);
            const NAME: &'static str = $label;

            fn letter(self) -> char {
                match self {
                    $(Self::$variant => $letter),+
                }
            }
        }
    };
}

alphabet! {
    /// Permissions of a blob or container scoped SAS.
    pub enum BlobPermission ("blob permission") {
        /// Read content, properties and metadata.
        Read = 'r',
        /// Append a block to an append blob.
        Add = 'a',
        /// Create a new blob.
        Create = 'c',
        /// Write content, properties, metadata or the block list.
        Write = 'w',
        /// Delete the blob.
        Delete = 'd',
        /// Delete a blob version.
        DeleteVersion = 'x',
        /// Permanently delete a soft-deleted blob or version.
        PermanentDelete = 'y',
        /// List blobs. Container scope only.
        List = 'l',
        /// Read or write blob index tags.
        Tag = 't',
        /// Find blobs by tag. Container scope only.
        Filter = 'f',
        /// Move or rename.
        Move = 'm',
        /// Get system properties (hierarchical namespace).
        Execute = 'e',
        /// Change owner or group (hierarchical namespace).
        Ownership = 'o',
        /// Change permissions (hierarchical namespace).
        Permissions = 'p',
        /// Set or delete an immutability policy or legal hold.
        SetImmutabilityPolicy = 'i',
    }
}

impl BlobPermission {
    /// Whether the permission only makes sense on a container.
    pub fn is_container_only(self) -> bool {
        matches!(self, Self::List | Self::Filter)
    }
}

alphabet! {
    /// Permissions of an account scoped SAS.
    pub enum AccountPermission ("account permission") {
        /// Read.
        Read = 'r',
        /// Write.
        Write = 'w',
        /// Delete.
        Delete = 'd',
        /// Delete a blob version.
        DeleteVersion = 'x',
        /// Permanently delete.
        PermanentDelete = 'y',
        /// List.
        List = 'l',
        /// Add (queue messages, table entities, append blocks).
        Add = 'a',
        /// Create.
        Create = 'c',
        /// Update (queue messages, table entities).
        Update = 'u',
        /// Process (queue messages).
        Process = 'p',
        /// Blob index tags.
        Tag = 't',
        /// Filter by blob index tags.
        Filter = 'f',
        /// Set or delete immutability policies.
        SetImmutabilityPolicy = 'i',
    }
}

alphabet! {
    /// Storage services an account SAS may grant access to.
    pub enum Service ("service") {
        /// Blob service.
        Blob = 'b',
        /// File service.
        File = 'f',
        /// Queue service.
        Queue = 'q',
        /// Table service.
        Table = 't',
    }
}

impl Service {
    /// The DNS label of the service in default endpoints.
    pub fn host_label(self) -> &'static str {
        match self {
            Self::Blob => "blob",
            Self::File => "file",
            Self::Queue => "queue",
            Self::Table => "table",
        }
    }

    /// The connection string key naming this service's endpoint.
    pub fn endpoint_key(self) -> &'static str {
        match self {
            Self::Blob => "BlobEndpoint",
            Self::File => "FileEndpoint",
            Self::Queue => "QueueEndpoint",
            Self::Table => "TableEndpoint",
        }
    }
}

alphabet! {
    /// Classes of resources an account SAS may grant access to.
    pub enum ResourceType ("resource type") {
        /// Service level APIs (list containers, service properties).
        Service = 's',
        /// Container level APIs (create container, list blobs).
        Container = 'c',
        /// Object level APIs (read or write a blob).
        Object = 'o',
    }
}

/// A set of letters that always renders in canonical order.
///
/// ```
/// use sas_credentials::{BlobPermission, BlobPermissions};
///
/// let permissions: BlobPermissions = [BlobPermission::Write, BlobPermission::Read]
///     .into_iter()
///     .collect();
/// assert_eq!(permissions.to_string(), "rw");
/// assert_eq!("wr".parse::<BlobPermissions>()?, permissions);
/// # Ok::<(), sas_credentials::ScopeError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LetterSet<L: Letter>(BTreeSet<L>);

/// Permissions of a blob or container SAS.
pub type BlobPermissions = LetterSet<BlobPermission>;
/// Permissions of an account SAS.
pub type AccountPermissions = LetterSet<AccountPermission>;
/// Services of an account SAS.
pub type Services = LetterSet<Service>;
/// Resource types of an account SAS.
pub type ResourceTypes = LetterSet<ResourceType>;

impl<L: Letter> LetterSet<L> {
    /// An empty set.
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Every member of the alphabet.
    pub fn all() -> Self {
        L::ALL.iter().copied().collect()
    }

    /// Add a member, builder style.
    pub fn with(mut self, member: L) -> Self {
        self.0.insert(member);
        self
    }

    /// Add a member.
    pub fn insert(&mut self, member: L) -> bool {
        self.0.insert(member)
    }

    /// Whether `member` is in the set.
    pub fn contains(&self, member: L) -> bool {
        self.0.contains(&member)
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Members in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = L> + '_ {
        self.0.iter().copied()
    }
}

impl<L: Letter> Default for LetterSet<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: Letter> FromIterator<L> for LetterSet<L> {
    fn from_iter<I: IntoIterator<Item = L>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<L: Letter> From<L> for LetterSet<L> {
    fn from(member: L) -> Self {
        Self::new().with(member)
    }
}

impl<L: Letter> fmt::Display for LetterSet<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for member in &self.0 {
            write!(f, "{}", member.letter())?;
        }
        Ok(())
    }
}

impl<L: Letter> FromStr for LetterSet<L> {
    type Err = ScopeError;

    /// Parse letters in any order. Repeated letters are accepted.
    fn from_str(letters: &str) -> Result<Self, Self::Err> {
        letters
            .chars()
            .map(|letter| {
                L::from_letter(letter).ok_or(ScopeError::IllegalPermission {
                    letter,
                    scope: L::NAME,
                    alphabet: L::ALPHABET,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_serializes_in_canonical_order_regardless_of_insertion() {
        let forward: BlobPermissions = [
            BlobPermission::Read,
            BlobPermission::List,
            BlobPermission::Write,
            BlobPermission::Delete,
        ]
        .into_iter()
        .collect();
        let backward: BlobPermissions = [
            BlobPermission::Delete,
            BlobPermission::Write,
            BlobPermission::List,
            BlobPermission::Read,
        ]
        .into_iter()
        .collect();

        assert_eq!(forward.to_string(), "rwdl");
        assert_eq!(forward.to_string(), backward.to_string());
        assert_eq!(forward, backward);
    }

    #[test]
    fn it_keeps_declaration_order_as_the_alphabet() {
        assert_eq!(BlobPermission::ALPHABET, "racwdxyltfmeopi");
        assert_eq!(AccountPermission::ALPHABET, "rwdxylacuptfi");
        assert_eq!(Service::ALPHABET, "bfqt");
        assert_eq!(ResourceType::ALPHABET, "sco");
    }

    #[test]
    fn it_parses_letters_in_any_order() {
        let permissions: AccountPermissions = "lr".parse().unwrap();
        assert_eq!(permissions.to_string(), "rl");

        let services: Services = "tb".parse().unwrap();
        assert_eq!(services.to_string(), "bt");
    }

    #[test]
    fn it_collapses_repeated_letters() {
        let permissions: BlobPermissions = "rrr".parse().unwrap();
        assert_eq!(permissions.len(), 1);
    }

    #[test]
    fn it_rejects_letters_outside_the_alphabet() {
        let error = "rlz".parse::<AccountPermissions>().unwrap_err();
        assert_eq!(
            error,
            ScopeError::IllegalPermission {
                letter: 'z',
                scope: "account permission",
                alphabet: "rwdxylacuptfi",
            }
        );

        // 'u' is legal for accounts but not for blobs
        assert!("u".parse::<BlobPermissions>().is_err());
        assert!("u".parse::<AccountPermissions>().is_ok());
    }

    #[test]
    fn it_renders_every_resource_type() {
        assert_eq!(ResourceTypes::all().to_string(), "sco");
        assert_eq!(Services::all().to_string(), "bfqt");
    }

    #[test]
    fn it_marks_container_only_permissions() {
        assert!(BlobPermission::List.is_container_only());
        assert!(BlobPermission::Filter.is_container_only());
        assert!(!BlobPermission::Read.is_container_only());
    }
}
