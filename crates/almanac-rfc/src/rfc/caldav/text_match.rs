//! `text-match` evaluation (RFC 4791 §9.7.5, RFC 4790 collations).

use serde::{Deserialize, Serialize};

use crate::error::{RfcError, RfcResult};

/// Comparison collation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Collation {
    /// Byte-for-byte comparison.
    Octet,
    /// ASCII letters compare case-insensitively.
    #[default]
    AsciiCasemap,
    /// Full Unicode upper-casing before comparison.
    UnicodeCasemap,
}

impl Collation {
    /// ## Summary
    /// Parses a collation identifier such as `i;ascii-casemap`.
    ///
    /// ## Errors
    /// Returns `RfcError::InvalidFilter` for unsupported collations.
    pub fn parse(name: &str) -> RfcResult<Self> {
        match name.to_ascii_lowercase().as_str() {
            "i;octet" => Ok(Self::Octet),
            "i;ascii-casemap" => Ok(Self::AsciiCasemap),
            "i;unicode-casemap" => Ok(Self::UnicodeCasemap),
            _ => Err(RfcError::InvalidFilter(format!(
                "unsupported collation: {name}"
            ))),
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Octet => "i;octet",
            Self::AsciiCasemap => "i;ascii-casemap",
            Self::UnicodeCasemap => "i;unicode-casemap",
        }
    }

    fn fold(self, s: &str) -> String {
        match self {
            Self::Octet => s.to_string(),
            Self::AsciiCasemap => s.to_ascii_uppercase(),
            Self::UnicodeCasemap => s.to_uppercase(),
        }
    }
}

/// How the needle is compared against the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchType {
    Equals,
    #[default]
    Contains,
    StartsWith,
    EndsWith,
}

/// Text matching criteria.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TextMatch {
    pub text: String,
    /// Collation identifier; `i;ascii-casemap` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collation: Option<String>,
    #[serde(default)]
    pub match_type: MatchType,
    #[serde(default)]
    pub negate_condition: bool,
    /// Chooses between `i;octet` (false) and `i;ascii-casemap` (true).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_insensitive: Option<bool>,
}

impl TextMatch {
    fn with_type(text: impl Into<String>, match_type: MatchType) -> Self {
        Self {
            text: text.into(),
            collation: None,
            match_type,
            negate_condition: false,
            case_insensitive: None,
        }
    }

    #[must_use]
    pub fn contains(text: impl Into<String>) -> Self {
        Self::with_type(text, MatchType::Contains)
    }

    #[must_use]
    pub fn equals(text: impl Into<String>) -> Self {
        Self::with_type(text, MatchType::Equals)
    }

    #[must_use]
    pub fn starts_with(text: impl Into<String>) -> Self {
        Self::with_type(text, MatchType::StartsWith)
    }

    #[must_use]
    pub fn ends_with(text: impl Into<String>) -> Self {
        Self::with_type(text, MatchType::EndsWith)
    }

    #[must_use]
    pub const fn negate(mut self) -> Self {
        self.negate_condition = true;
        self
    }

    #[must_use]
    pub fn with_collation(mut self, collation: Collation) -> Self {
        self.collation = Some(collation.as_str().to_string());
        self
    }

    #[must_use]
    pub const fn case_sensitive(mut self, sensitive: bool) -> Self {
        self.case_insensitive = Some(!sensitive);
        self
    }

    /// ## Summary
    /// Effective collation after applying the `case-insensitive` override.
    ///
    /// ## Errors
    /// Returns `RfcError::InvalidFilter` for unsupported collations.
    pub fn effective_collation(&self) -> RfcResult<Collation> {
        let declared = self
            .collation
            .as_deref()
            .map(Collation::parse)
            .transpose()?
            .unwrap_or_default();
        Ok(match (self.case_insensitive, declared) {
            (Some(false), _) => Collation::Octet,
            (Some(true), Collation::Octet) => Collation::AsciiCasemap,
            (_, collation) => collation,
        })
    }

    /// ## Summary
    /// Tests `value` against the needle, honouring `negate-condition`.
    ///
    /// An unsupported collation never matches; filters are expected to be
    /// checked with [`Self::effective_collation`] first.
    #[must_use]
    pub fn matches(&self, value: &str) -> bool {
        let Ok(collation) = self.effective_collation() else {
            return false;
        };
        let haystack = collation.fold(value);
        let needle = collation.fold(&self.text);
        let found = match self.match_type {
            MatchType::Equals => haystack == needle,
            MatchType::Contains => haystack.contains(&needle),
            MatchType::StartsWith => haystack.starts_with(&needle),
            MatchType::EndsWith => haystack.ends_with(&needle),
        };
        found != self.negate_condition
    }
}
