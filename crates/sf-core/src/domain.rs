//! Hostname normalization and the user's work-domain set.

use std::borrow::Borrow;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Dot-separated DNS labels, lowercase.
static DOMAIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?(\.[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?)*$")
        .unwrap()
});

/// Longest hostname DNS allows.
const MAX_HOSTNAME_LEN: usize = 253;

/// Internal browser pages that can never be gated.
const RESTRICTED_PREFIXES: &[&str] = &[
    "chrome://",
    "chrome-extension://",
    "edge://",
    "about:",
    "devtools://",
    "view-source:",
    "moz-extension://",
    "file:",
];

/// Rejected user input for a work domain.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("domain cannot be empty")]
    EmptyDomain,
    #[error("invalid domain format: {input}")]
    InvalidDomain { input: String },
    #[error("domain is too long ({len} characters, max {MAX_HOSTNAME_LEN})")]
    DomainTooLong { len: usize },
}

/// Returns true for URLs that point at internal browser pages.
pub fn is_restricted_url(url: &str) -> bool {
    let url = url.trim().to_ascii_lowercase();
    url.is_empty() || RESTRICTED_PREFIXES.iter().any(|prefix| url.starts_with(prefix))
}

/// Lowercases a hostname and strips a leading `www.`.
pub fn normalize_hostname(host: &str) -> String {
    let host = host.trim().trim_end_matches('.').to_ascii_lowercase();
    if let Some(rest) = host.strip_prefix("www.") {
        return rest.to_string();
    }
    host
}

/// Extracts the normalized hostname from a URL.
///
/// Inputs without a scheme (`www.school.edu/page`) are read as `https://`.
/// A URL with an explicit `scheme://` but no host (`file:///home/x`) has none.
pub fn hostname_from_url(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    let parsed = match Url::parse(trimmed) {
        Ok(url) if url.host_str().is_some() => url,
        Ok(_) if trimmed.contains("://") => return None,
        // `reddit.com` has no scheme; `localhost:8080` parses as one.
        _ => Url::parse(&format!("https://{trimmed}")).ok()?,
    };
    let host = normalize_hostname(parsed.host_str()?);
    (!host.is_empty()).then_some(host)
}

/// A validated, normalized work hostname.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WorkDomain(String);

impl WorkDomain {
    /// Parses user input: either a bare hostname or a full URL.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyDomain);
        }
        let host = if trimmed.contains("://") || trimmed.contains('/') {
            hostname_from_url(trimmed).ok_or_else(|| ValidationError::InvalidDomain {
                input: trimmed.to_string(),
            })?
        } else {
            normalize_hostname(trimmed)
        };
        if host.len() > MAX_HOSTNAME_LEN {
            return Err(ValidationError::DomainTooLong { len: host.len() });
        }
        if !DOMAIN_RE.is_match(&host) {
            return Err(ValidationError::InvalidDomain {
                input: trimmed.to_string(),
            });
        }
        Ok(Self(host))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for WorkDomain {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<WorkDomain> for String {
    fn from(domain: WorkDomain) -> Self {
        domain.0
    }
}

// `WorkDomain` orders exactly like its inner string, so set lookups by `&str`
// agree with the set's ordering.
impl Borrow<str> for WorkDomain {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hostnames the user has marked as work. Membership is exact after
/// normalization; subdomains are not matched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkDomainSet(BTreeSet<WorkDomain>);

impl WorkDomainSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set from stored strings, dropping entries that fail validation.
    pub fn from_entries<I, T>(entries: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let mut set = Self::new();
        for entry in entries {
            match WorkDomain::parse(entry.as_ref()) {
                Ok(domain) => {
                    set.0.insert(domain);
                }
                Err(err) => {
                    tracing::warn!(entry = entry.as_ref(), %err, "dropping invalid work domain");
                }
            }
        }
        set
    }

    /// Returns true if the domain was not already present.
    pub fn insert(&mut self, domain: WorkDomain) -> bool {
        self.0.insert(domain)
    }

    /// Removes a hostname (normalized first). Returns true if it was present.
    pub fn remove(&mut self, host: &str) -> bool {
        self.0.remove(normalize_hostname(host).as_str())
    }

    pub fn contains(&self, host: &str) -> bool {
        self.0.contains(normalize_hostname(host).as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(WorkDomain::as_str)
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.iter().map(str::to_string).collect()
    }
}

impl Serialize for WorkDomainSet {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for WorkDomainSet {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let entries = Vec::<String>::deserialize(deserializer)?;
        Ok(Self::from_entries(entries))
    }
}
