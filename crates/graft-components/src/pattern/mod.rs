//! Path patterns declared by handler and filter roles.
//!
//! Four forms are recognised: exact paths (`/orders`), prefix wildcards
//! (`/api/*`), extension wildcards (`*.csv`) and the default pattern (`/`),
//! which matches every path.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// A parsed path pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UrlPattern {
    /// Matches one path exactly.
    Exact(String),
    /// Matches the prefix itself and every path beneath it. An empty prefix
    /// (`/*`) matches everything.
    Prefix(String),
    /// Matches paths whose final segment ends in `.{extension}`.
    Extension(String),
    /// The catch-all pattern `/`.
    Default,
}

/// Errors raised when a declared pattern is not understood.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    /// The pattern was empty.
    #[error("path pattern is empty")]
    Empty,
    /// The pattern neither starts with `/` nor is an extension wildcard.
    #[error("path pattern '{0}' must start with '/' or '*.'")]
    Unanchored(String),
    /// A wildcard appeared somewhere other than the supported positions.
    #[error("path pattern '{0}' has a misplaced wildcard")]
    MisplacedWildcard(String),
}

impl UrlPattern {
    /// Parses a declared pattern.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError`] when the text is empty, unanchored or uses a
    /// wildcard outside the trailing `/*` or leading `*.` positions.
    pub fn parse(input: &str) -> Result<Self, PatternError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(PatternError::Empty);
        }
        if trimmed == "/" {
            return Ok(Self::Default);
        }
        if let Some(extension) = trimmed.strip_prefix("*.") {
            if extension.is_empty() || extension.contains(['*', '/']) {
                return Err(PatternError::MisplacedWildcard(trimmed.to_owned()));
            }
            return Ok(Self::Extension(extension.to_owned()));
        }
        if !trimmed.starts_with('/') {
            return Err(PatternError::Unanchored(trimmed.to_owned()));
        }
        if let Some(prefix) = trimmed.strip_suffix("/*") {
            if prefix.contains('*') {
                return Err(PatternError::MisplacedWildcard(trimmed.to_owned()));
            }
            return Ok(Self::Prefix(prefix.to_owned()));
        }
        if trimmed.contains('*') {
            return Err(PatternError::MisplacedWildcard(trimmed.to_owned()));
        }
        Ok(Self::Exact(trimmed.to_owned()))
    }

    /// Returns `true` when `path` falls under this pattern.
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        match self {
            Self::Exact(exact) => path == exact,
            Self::Prefix(prefix) => {
                prefix.is_empty()
                    || path == prefix
                    || path
                        .strip_prefix(prefix.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
            }
            Self::Extension(extension) => path
                .rsplit('/')
                .next()
                .and_then(|segment| segment.rsplit_once('.'))
                .is_some_and(|(_, suffix)| suffix == extension),
            Self::Default => true,
        }
    }

    /// Routing precedence: exact beats prefix (longest first), prefix beats
    /// extension, extension beats the default pattern.
    #[must_use]
    pub fn specificity(&self) -> (u8, usize) {
        match self {
            Self::Exact(exact) => (3, exact.len()),
            Self::Prefix(prefix) => (2, prefix.len()),
            Self::Extension(_) => (1, 0),
            Self::Default => (0, 0),
        }
    }
}

impl FromStr for UrlPattern {
    type Err = PatternError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        Self::parse(input)
    }
}

impl fmt::Display for UrlPattern {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(exact) => formatter.write_str(exact),
            Self::Prefix(prefix) => write!(formatter, "{prefix}/*"),
            Self::Extension(extension) => write!(formatter, "*.{extension}"),
            Self::Default => formatter.write_str("/"),
        }
    }
}
