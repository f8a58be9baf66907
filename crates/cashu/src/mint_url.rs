//! A mint's base URL, normalized so two URLs differing only by a trailing
//! slash compare equal (spec §4.H: "Mint URL equality MUST normalize
//! trailing slashes").

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MintUrl(String);

impl MintUrl {
    fn normalize(raw: &str) -> String {
        raw.trim_end_matches('/').to_string()
    }
}

impl FromStr for MintUrl {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Validate shape without retaining url::Url's own normalization
        // quirks (it would re-add a trailing slash on bare-origin URLs).
        url::Url::parse(s)?;
        Ok(Self(Self::normalize(s)))
    }
}

impl fmt::Display for MintUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PartialEq for MintUrl {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl std::hash::Hash for MintUrl {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl MintUrl {
    /// The normalized URL string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_normalizes_equal() {
        let a = MintUrl::from_str("https://mint.example.com").unwrap();
        let b = MintUrl::from_str("https://mint.example.com/").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_hosts_are_unequal() {
        let a = MintUrl::from_str("https://mint-a.example.com").unwrap();
        let b = MintUrl::from_str("https://mint-b.example.com").unwrap();
        assert_ne!(a, b);
    }
}
