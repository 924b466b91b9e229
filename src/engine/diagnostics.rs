//! Non-fatal load diagnostics.
//!
//! A load only fails on a broken header. Every other oddity in the data is
//! absorbed with a best-effort default and recorded here, so the caller always
//! gets a usable (if partial) rule set and can still show what was wrong.
//!
//! Each diagnostic is logged through `tracing` at the moment it is recorded:
//! `warn` for conditions that change what the map shows (an unreachable
//! territory, a shadowed code), `debug` for routine data-entry noise.

use crate::{Field, TerritoryId};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A row without an identifier was dropped.
    RowSkipped { line: usize },
    /// A numeric cell could not be read and counts as zero.
    NumericCoercion { line: usize, field: Field, raw: String },
    /// A territory ended up with no tokens, so no code can ever resolve to it.
    UnreachableRule { id: TerritoryId },
    /// A token that is nothing but a marker (`+`, `*`).
    MalformedToken { id: TerritoryId, raw: String },
    /// A later row reused an id; its metadata replaced the earlier row's.
    DuplicateTerritory { id: TerritoryId, line: usize },
    /// An exact code was already claimed by an earlier territory.
    ShadowedExact { code: String, kept: TerritoryId, shadowed: TerritoryId },
}

impl Diagnostic {
    fn log(&self) {
        match self {
            Diagnostic::RowSkipped { line } => tracing::debug!(line, "row without territory id skipped"),
            Diagnostic::NumericCoercion { line, field, raw } => {
                tracing::debug!(line, field = %field, raw = %raw, "unparsable number coerced to 0")
            }
            Diagnostic::UnreachableRule { id } => tracing::warn!(territory = %id, "territory has no postcode tokens"),
            Diagnostic::MalformedToken { id, raw } => {
                tracing::warn!(territory = %id, token = %raw, "token has no code before its marker")
            }
            Diagnostic::DuplicateTerritory { id, line } => {
                tracing::warn!(territory = %id, line, "duplicate territory id; metadata replaced, tokens appended")
            }
            Diagnostic::ShadowedExact { code, kept, shadowed } => {
                tracing::warn!(code = %code, kept = %kept, shadowed = %shadowed, "exact code claimed twice")
            }
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::RowSkipped { line } => write!(f, "line {line}: row skipped (no territory id)"),
            Diagnostic::NumericCoercion { line, field, raw } => {
                write!(f, "line {line}: {field} {raw:?} is not a number, using 0")
            }
            Diagnostic::UnreachableRule { id } => write!(f, "{id}: no postcode tokens, territory is unreachable"),
            Diagnostic::MalformedToken { id, raw } => write!(f, "{id}: token {raw:?} dropped (no code)"),
            Diagnostic::DuplicateTerritory { id, line } => write!(f, "line {line}: duplicate territory id {id}"),
            Diagnostic::ShadowedExact { code, kept, shadowed } => {
                write!(f, "{code}: exact code already owned by {kept}, ignored for {shadowed}")
            }
        }
    }
}

/// Collects diagnostics for one compile, logging each as it arrives.
#[derive(Debug, Default)]
pub(crate) struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn push(&mut self, diagnostic: Diagnostic) {
        diagnostic.log();
        self.items.push(diagnostic);
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.items
    }
}
