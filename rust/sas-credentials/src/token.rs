//! Signed tokens and their query string form.

use std::fmt;

use url::form_urlencoded;

use crate::TokenError;

/// Order in which parameters appear in a serialized token.
pub const PARAMETER_ORDER: &[&str] = &[
    "sv", "ss", "srt", "spr", "st", "se", "sip", "si", "skoid", "sktid", "skt", "ske", "sks", "skv",
    "sr", "sp", "sig",
];

/// A finished shared access signature: an ordered list of query parameters.
///
/// Parameters are kept in [`PARAMETER_ORDER`]; any parameter not listed
/// there (only possible through [`SignedToken::parse`]) follows the known
/// ones in the order it was read.
///
/// ```
/// use sas_credentials::SignedToken;
///
/// let token = SignedToken::parse("sp=r&sv=2022-11-02&sig=a%2Bb%3D")?;
/// assert_eq!(token.get("sig"), Some("a+b="));
/// assert_eq!(token.to_string(), "sv=2022-11-02&sp=r&sig=a%2Bb%3D");
/// # Ok::<(), sas_credentials::TokenError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SignedToken {
    parameters: Vec<(String, String)>,
}

impl SignedToken {
    /// Build a token from unencoded `(name, value)` pairs.
    pub fn new<K, V>(parameters: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut parameters: Vec<(String, String)> = parameters
            .into_iter()
            .map(|(name, value)| (name.into(), value.into()))
            .collect();
        parameters.sort_by_key(|(name, _)| position(name));
        Self { parameters }
    }

    /// Read a token back from its query string, with or without a leading
    /// `?`.
    pub fn parse(query: &str) -> Result<Self, TokenError> {
        let query = query.strip_prefix('?').unwrap_or(query);
        let mut parameters: Vec<(String, String)> = Vec::new();

        for (name, value) in form_urlencoded::parse(query.as_bytes()) {
            if parameters.iter().any(|(seen, _)| *seen == name) {
                return Err(TokenError::DuplicateParameter {
                    name: name.into_owned(),
                });
            }
            parameters.push((name.into_owned(), value.into_owned()));
        }

        Ok(Self::new(parameters))
    }

    /// The unencoded value of `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(parameter, _)| parameter == name)
            .map(|(_, value)| value.as_str())
    }

    /// The base64 signature (`sig`).
    pub fn signature(&self) -> Option<&str> {
        self.get("sig")
    }

    /// Parameter names and unencoded values, in serialization order.
    pub fn parameters(&self) -> impl Iterator<Item = (&str, &str)> {
        self.parameters
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// The query string, without a leading `?`.
    pub fn query(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for SignedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, (name, value)) in self.parameters.iter().enumerate() {
            if index > 0 {
                f.write_str("&")?;
            }
            write!(f, "{}={}", percent_encode(name), percent_encode(value))?;
        }
        Ok(())
    }
}

fn position(name: &str) -> usize {
    PARAMETER_ORDER
        .iter()
        .position(|known| *known == name)
        .unwrap_or(PARAMETER_ORDER.len())
}

const HEX: &[u8; 16] = b"0123456789ABCDEF";

/// Percent-encode a string for URL use.
///
/// Everything but `A-Z a-z 0-9 - _ . ~` is encoded.
pub fn percent_encode(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => {
                result.push('%');
                result.push(HEX[usize::from(byte >> 4)] as char);
                result.push(HEX[usize::from(byte & 0x0f)] as char);
            }
        }
    }
    result
}

/// Percent-encode a URL path (preserving slashes).
pub fn percent_encode_path(path: &str) -> String {
    path.split('/')
        .map(percent_encode)
        .collect::<Vec<_>>()
        .join("/")
}
