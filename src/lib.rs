use serde::Serialize;
use std::borrow::Borrow;
use std::fmt;

#[macro_use]
mod macros;
mod api;
mod engine;


pub use api::{Atlas, DEFAULT_PALETTE, Generation, Options, Style, reload, reload_with};
pub use engine::{
    Branch, Diagnostic, Expr, Field, MatchArm, PrefixRule, Record, Resolution, RuleSet, SchemaInvalid, Table,
    TerritoryMetadata, Tier, TierMask, Value,
};

/// Result alias for loads; the only fatal load failure is [`SchemaInvalid`].
pub type Result<T, E = SchemaInvalid> = std::result::Result<T, E>;

// --- Domain types -----------------------------------------------------------

/// Identifier of a territory, exactly as it appears in the source table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TerritoryId(String);

impl TerritoryId {
    pub fn new(id: impl Into<String>) -> Self {
        TerritoryId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TerritoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for TerritoryId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for TerritoryId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for TerritoryId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// One entry of a territory's postcode field, classified by its trailing marker.
///
/// ```text
/// "SE22"  -> Exact("SE22")
/// "w1+"   -> LetterContinuation("W1")   W1, W1A, W1AB ... but not W12
/// "EC1*"  -> AnyContinuation("EC1")     EC1, EC1A, EC12 ...
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RawToken {
    Exact(String),
    LetterContinuation(String),
    AnyContinuation(String),
}

impl RawToken {
    /// Classify a single raw token. Returns `None` when nothing is left once the
    /// marker is stripped.
    pub fn parse(raw: &str) -> Option<RawToken> {
        let upper = raw.trim().to_uppercase();
        let token = if let Some(prefix) = upper.strip_suffix('+') {
            RawToken::LetterContinuation(prefix.trim_end().to_string())
        } else if let Some(prefix) = upper.strip_suffix('*') {
            RawToken::AnyContinuation(prefix.trim_end().to_string())
        } else {
            RawToken::Exact(upper)
        };

        if token.code().is_empty() { None } else { Some(token) }
    }

    /// The code (for `Exact`) or prefix (for the continuation kinds), marker stripped.
    pub fn code(&self) -> &str {
        match self {
            RawToken::Exact(code) | RawToken::LetterContinuation(code) | RawToken::AnyContinuation(code) => code,
        }
    }

    pub fn tier(&self) -> Tier {
        match self {
            RawToken::Exact(_) => Tier::Exact,
            RawToken::LetterContinuation(_) => Tier::LetterContinuation,
            RawToken::AnyContinuation(_) => Tier::AnyContinuation,
        }
    }
}

impl fmt::Display for RawToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawToken::Exact(code) => write!(f, "{code}"),
            RawToken::LetterContinuation(prefix) => write!(f, "{prefix}+"),
            RawToken::AnyContinuation(prefix) => write!(f, "{prefix}*"),
        }
    }
}

/// Availability of a territory. Only `Taken` dims.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Status {
    #[default]
    Available,
    Taken,
    /// Any other label, kept lowercased for display. Behaves as available.
    Other(String),
}

impl Status {
    pub fn parse(raw: &str) -> Status {
        let label = raw.trim().to_lowercase();
        match label.as_str() {
            "" | "available" => Status::Available,
            "taken" => Status::Taken,
            _ => Status::Other(label),
        }
    }

    pub fn is_taken(&self) -> bool {
        matches!(self, Status::Taken)
    }

    pub fn label(&self) -> &str {
        match self {
            Status::Available => "available",
            Status::Taken => "taken",
            Status::Other(label) => label,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for Status {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

/// A compiled territory: metadata plus the tokens it declared, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct Territory {
    pub id: TerritoryId,
    pub region: String,
    pub population: u64,
    pub business_count: u64,
    /// Free text; never parsed numerically.
    pub income: String,
    pub status: Status,
    pub tokens: Vec<RawToken>,
    /// Palette color picked from the registration slot.
    pub color: String,
    /// Registration position (0-based) of the last row declaring this id.
    pub slot: usize,
}

impl Territory {
    pub fn is_taken(&self) -> bool {
        self.status.is_taken()
    }
}
