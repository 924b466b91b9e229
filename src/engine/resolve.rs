//! Code resolution (the classifier).
//!
//! Given a compiled [`RuleSet`], find the territory that owns a postcode
//! code. The scan is pure and reads nothing but the rule set, so any number
//! of lookups can run against one rule set in any order.
//!
//! ```text
//! code ─ trim + uppercase
//!   │
//!   ├─ 1. Exact         hash lookup                      ── hit ─▶ owner
//!   ├─ 2. Letter (+)    prefix, then end or A–Z          ── first hit ─▶ owner
//!   ├─ 3. Any (*)       prefix                           ── first hit ─▶ owner
//!   └─ 4. none
//! ```
//!
//! Within a tier the first rule in declaration order wins. There is no
//! longest-prefix preference: with `W+` declared before `W1+`, `W1A` belongs
//! to the `W+` territory.

use super::compiled_rules::{PrefixRule, RuleSet, Tier, TierMask};
use crate::{Territory, TerritoryId};

/// Why a code resolved the way it did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolution<'a> {
    pub territory: &'a Territory,
    pub tier: Tier,
    /// The code or prefix of the rule that matched, without marker.
    pub rule: &'a str,
}

/// Canonical form of a lookup code.
pub(crate) fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// `W1+` matches `W1`, `W1A`, `W1AB`; not `W12`.
pub(crate) fn letter_continuation_matches(prefix: &str, code: &str) -> bool {
    match code.strip_prefix(prefix) {
        Some(rest) => rest.chars().next().is_none_or(|c| c.is_ascii_uppercase()),
        None => false,
    }
}

/// `EC1*` matches anything starting with `EC1`.
pub(crate) fn any_continuation_matches(prefix: &str, code: &str) -> bool {
    code.starts_with(prefix)
}

impl RuleSet {
    /// Resolve `code` and report the tier and rule that decided it.
    pub fn explain(&self, code: &str) -> Option<Resolution<'_>> {
        let code = normalize_code(code);
        let resolution = self.resolve_normalized(&code);

        match &resolution {
            Some(r) => {
                tracing::trace!(code = %code, territory = %r.territory.id, tier = ?r.tier, rule = r.rule, "resolved")
            }
            None => tracing::trace!(code = %code, "unmatched"),
        }
        resolution
    }

    fn resolve_normalized(&self, code: &str) -> Option<Resolution<'_>> {
        if self.tiers.contains(TierMask::EXACT) {
            if let Some((rule, &idx)) = self.exact.get_key_value(code) {
                return Some(Resolution { territory: &self.territories[idx], tier: Tier::Exact, rule });
            }
        }

        if self.tiers.contains(TierMask::LETTER) {
            if let Some(hit) = self.first_prefix_hit(&self.letter, Tier::LetterContinuation, code) {
                return Some(hit);
            }
        }

        if self.tiers.contains(TierMask::ANY) {
            if let Some(hit) = self.first_prefix_hit(&self.any, Tier::AnyContinuation, code) {
                return Some(hit);
            }
        }

        None
    }

    fn first_prefix_hit<'a>(&'a self, rules: &'a [PrefixRule], tier: Tier, code: &str) -> Option<Resolution<'a>> {
        let matches = match tier {
            Tier::LetterContinuation => letter_continuation_matches,
            _ => any_continuation_matches,
        };
        rules
            .iter()
            .find(|rule| matches(&rule.prefix, code))
            .map(|rule| Resolution { territory: self.owner_of(rule), tier, rule: &rule.prefix })
    }

    /// Territory id owning `code`, if any.
    pub fn classify(&self, code: &str) -> Option<&TerritoryId> {
        self.explain(code).map(|r| &r.territory.id)
    }

    /// Whether the owner of `code` is taken. Unowned codes are not taken.
    pub fn is_taken(&self, code: &str) -> bool {
        self.explain(code).is_some_and(|r| r.territory.is_taken())
    }

    /// Display color for `code`: the owner's palette color or the unmatched color.
    pub fn color_for(&self, code: &str) -> &str {
        self.explain(code).map_or(self.style.unmatched_color.as_str(), |r| r.territory.color.as_str())
    }

    /// Fill opacity for `code`: dimmed when the owner is taken.
    pub fn opacity_for(&self, code: &str) -> f64 {
        if self.is_taken(code) { self.style.dimmed_opacity } else { self.style.normal_opacity }
    }
}
