//! Rule compilation and indexing.
//!
//! This module holds the *static* side of the engine: the immutable
//! [`RuleSet`] derived from resolved records. Classification and style
//! expressions only ever read it.
//!
//! Loading is split into two phases:
//!
//! 1. **Resolve** (`schema.rs`): text to `Record`s.
//! 2. **Compile** (this module): `Record`s to territories plus three indexes,
//!    one per precedence tier.
//!
//! ## Indexes
//!
//! ```text
//! exact   HashMap<code, TerritoryIdx>     first claim wins
//! letter  Vec<PrefixRule>                 declaration order, never sorted
//! any     Vec<PrefixRule>                 declaration order, never sorted
//! ```
//!
//! Declaration order is the order rows and tokens appear in the source. The
//! prefix lists are scanned front to back at lookup time, so reordering them
//! (for example by prefix length) would change which territory owns an
//! overlapping code.
//!
//! ## Invariants
//!
//! - `TerritoryIdx` is an index into `RuleSet::territories`; `by_id` and every
//!   index refer to the same vector.
//! - A territory's palette slot is the registration position of the last row
//!   that declared it (rows without an id do not count), so colors follow
//!   registration order and cycle through the palette.
//! - Nothing here is mutated after `compile` returns.

use super::diagnostics::{Diagnostic, Diagnostics};
use super::schema::{Field, Record};
use crate::{Options, RawToken, Status, Style, Territory, TerritoryId};
use serde::Serialize;
use std::collections::HashMap;

/// Territory identifier inside one rule set (index into the territories vector).
pub(crate) type TerritoryIdx = usize;

/// Precedence tiers, highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Exact,
    LetterContinuation,
    AnyContinuation,
}

impl Tier {
    pub fn mask(self) -> TierMask {
        match self {
            Tier::Exact => TierMask::EXACT,
            Tier::LetterContinuation => TierMask::LETTER,
            Tier::AnyContinuation => TierMask::ANY,
        }
    }
}

bitflags::bitflags! {
    /// Which precedence tiers a rule set actually populates.
    ///
    /// Empty tiers are skipped by the classifier and left out of style
    /// expressions.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TierMask: u8 {
        const EXACT  = 1 << 0;
        const LETTER = 1 << 1;
        const ANY    = 1 << 2;
    }
}

/// A continuation rule: a prefix and the territory that declared it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixRule {
    pub prefix: String,
    pub(crate) territory: TerritoryIdx,
}

/// Popup/info-panel view of a territory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TerritoryMetadata {
    pub id: TerritoryId,
    pub region: String,
    pub population: u64,
    pub business_count: u64,
    pub income: String,
    pub status: Status,
    /// Tokens as declared, marker included (`W1+`, `EC1*`).
    pub tokens: Vec<String>,
    pub color: String,
}

/// Immutable compiled rule set for one load.
#[derive(Debug, Clone)]
pub struct RuleSet {
    pub(crate) territories: Vec<Territory>,
    pub(crate) by_id: HashMap<TerritoryId, TerritoryIdx>,
    pub(crate) exact: HashMap<String, TerritoryIdx>,
    /// Exact codes in the order they were first claimed.
    pub(crate) exact_order: Vec<String>,
    pub(crate) letter: Vec<PrefixRule>,
    pub(crate) any: Vec<PrefixRule>,
    pub(crate) tiers: TierMask,
    pub(crate) style: Style,
    pub(crate) diagnostics: Vec<Diagnostic>,
}

impl RuleSet {
    /// A rule set with no territories: every code is unmatched.
    pub fn empty(options: &Options) -> Self {
        RuleSet::compile(&[], options)
    }

    /// Compile resolved records into a rule set.
    ///
    /// Never fails: rows without an id are skipped, unreadable numbers become
    /// zero, and territories without tokens are kept but reported. See
    /// [`RuleSet::diagnostics`].
    pub fn compile(records: &[Record], options: &Options) -> Self {
        let palette = options.palette();
        let mut diagnostics = Diagnostics::default();
        let mut territories: Vec<Territory> = Vec::new();
        let mut by_id: HashMap<TerritoryId, TerritoryIdx> = HashMap::new();
        let mut exact: HashMap<String, TerritoryIdx> = HashMap::new();
        let mut exact_order = Vec::new();
        let mut letter = Vec::new();
        let mut any = Vec::new();
        let mut registrations = 0usize;

        for record in records {
            let id = record.get(Field::Id);
            if id.is_empty() {
                diagnostics.push(Diagnostic::RowSkipped { line: record.line });
                continue;
            }
            let id = TerritoryId::new(id);

            let tokens = split_tokens(record.get(Field::Tokens), &id, &mut diagnostics);
            let population = coerce_count(record, Field::Population, &mut diagnostics);
            let business_count = coerce_count(record, Field::BusinessCount, &mut diagnostics);
            let slot = registrations;
            registrations += 1;

            let idx = match by_id.get(&id) {
                Some(&idx) => {
                    diagnostics.push(Diagnostic::DuplicateTerritory { id: id.clone(), line: record.line });
                    let existing = &mut territories[idx];
                    existing.region = record.get(Field::Region).to_string();
                    existing.population = population;
                    existing.business_count = business_count;
                    existing.income = record.get(Field::Income).to_string();
                    existing.status = Status::parse(record.get(Field::Status));
                    existing.tokens.extend(tokens.iter().cloned());
                    existing.color = palette[slot % palette.len()].clone();
                    existing.slot = slot;
                    idx
                }
                None => {
                    let idx = territories.len();
                    territories.push(Territory {
                        id: id.clone(),
                        region: record.get(Field::Region).to_string(),
                        population,
                        business_count,
                        income: record.get(Field::Income).to_string(),
                        status: Status::parse(record.get(Field::Status)),
                        tokens: tokens.clone(),
                        color: palette[slot % palette.len()].clone(),
                        slot,
                    });
                    by_id.insert(id.clone(), idx);
                    idx
                }
            };

            for token in tokens {
                match token {
                    RawToken::Exact(code) => match exact.get(&code) {
                        Some(&owner) if owner != idx => diagnostics.push(Diagnostic::ShadowedExact {
                            code,
                            kept: territories[owner].id.clone(),
                            shadowed: id.clone(),
                        }),
                        Some(_) => {}
                        None => {
                            exact.insert(code.clone(), idx);
                            exact_order.push(code);
                        }
                    },
                    RawToken::LetterContinuation(prefix) => letter.push(PrefixRule { prefix, territory: idx }),
                    RawToken::AnyContinuation(prefix) => any.push(PrefixRule { prefix, territory: idx }),
                }
            }
        }

        for territory in territories.iter().filter(|t| t.tokens.is_empty()) {
            diagnostics.push(Diagnostic::UnreachableRule { id: territory.id.clone() });
        }

        let mut tiers = TierMask::empty();
        tiers.set(TierMask::EXACT, !exact.is_empty());
        tiers.set(TierMask::LETTER, !letter.is_empty());
        tiers.set(TierMask::ANY, !any.is_empty());

        tracing::debug!(
            territories = territories.len(),
            exact = exact.len(),
            letter = letter.len(),
            any = any.len(),
            "compiled rule set"
        );

        RuleSet {
            territories,
            by_id,
            exact,
            exact_order,
            letter,
            any,
            tiers,
            style: options.style.clone(),
            diagnostics: diagnostics.into_vec(),
        }
    }

    /// Territories in registration order.
    pub fn territories(&self) -> &[Territory] {
        &self.territories
    }

    pub fn territory(&self, id: &str) -> Option<&Territory> {
        self.by_id.get(id).map(|&idx| &self.territories[idx])
    }

    /// Info-panel view of one territory.
    pub fn territory_metadata(&self, id: &str) -> Option<TerritoryMetadata> {
        let t = self.territory(id)?;
        Some(TerritoryMetadata {
            id: t.id.clone(),
            region: t.region.clone(),
            population: t.population,
            business_count: t.business_count,
            income: t.income.clone(),
            status: t.status.clone(),
            tokens: t.tokens.iter().map(|tok| tok.to_string()).collect(),
            color: t.color.clone(),
        })
    }

    /// Letter-continuation rules in declaration order.
    pub fn letter_rules(&self) -> &[PrefixRule] {
        &self.letter
    }

    /// Any-continuation rules in declaration order.
    pub fn any_rules(&self) -> &[PrefixRule] {
        &self.any
    }

    pub fn tiers(&self) -> TierMask {
        self.tiers
    }

    pub fn style(&self) -> &Style {
        &self.style
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn is_empty(&self) -> bool {
        self.territories.is_empty()
    }

    pub(crate) fn owner_of(&self, rule: &PrefixRule) -> &Territory {
        &self.territories[rule.territory]
    }

    /// Exact codes grouped by owning territory, territories in registration
    /// order, codes in declaration order. Shadowed codes are not included.
    pub(crate) fn exact_groups(&self) -> Vec<(TerritoryIdx, Vec<&str>)> {
        let mut groups: Vec<(TerritoryIdx, Vec<&str>)> = Vec::new();
        for code in &self.exact_order {
            let owner = self.exact[code];
            match groups.iter_mut().find(|(idx, _)| *idx == owner) {
                Some((_, codes)) => codes.push(code),
                None => groups.push((owner, vec![code.as_str()])),
            }
        }
        groups.sort_by_key(|(idx, _)| *idx);
        groups
    }
}

/// Split a token cell on `|` (or `;` when there is no `|`) and classify each
/// non-empty token.
fn split_tokens(cell: &str, id: &TerritoryId, diagnostics: &mut Diagnostics) -> Vec<RawToken> {
    let separator = if cell.contains('|') { '|' } else { ';' };
    cell.split(separator)
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .filter_map(|raw| {
            let token = RawToken::parse(raw);
            if token.is_none() {
                diagnostics.push(Diagnostic::MalformedToken { id: id.clone(), raw: raw.to_string() });
            }
            token
        })
        .collect()
}

/// Read a non-negative count, keeping only digits, signs and decimal points.
///
/// `"£45,000"` reads as 45000; `"n/a"` reads as 0 and is reported. Negative
/// values clamp to 0 and fractions are truncated.
fn coerce_count(record: &Record, field: Field, diagnostics: &mut Diagnostics) -> u64 {
    let raw = record.get(field);
    if raw.is_empty() {
        return 0;
    }

    let cleaned = regex!(r"[^0-9+\-.]").replace_all(raw, "");
    match cleaned.parse::<f64>() {
        Ok(value) if value.is_finite() => {
            if value <= 0.0 {
                0
            } else {
                value.trunc() as u64
            }
        }
        _ => {
            diagnostics.push(Diagnostic::NumericCoercion { line: record.line, field, raw: raw.to_string() });
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Table;
    use pretty_assertions::assert_eq;

    fn compile(text: &str) -> RuleSet {
        let table = Table::resolve(text).unwrap();
        RuleSet::compile(&table.records, &Options::default())
    }

    fn record(line: usize, id: &str, tokens: &str) -> Record {
        Record::new(line).with(Field::Id, id).with(Field::Tokens, tokens)
    }

    #[test]
    fn tokens_are_classified_by_marker() {
        let rules = compile("id,postcodes\nT1,se22 | w1+ |EC1* ||\n");
        let t1 = rules.territory("T1").unwrap();
        assert_eq!(
            t1.tokens,
            vec![
                RawToken::Exact("SE22".into()),
                RawToken::LetterContinuation("W1".into()),
                RawToken::AnyContinuation("EC1".into()),
            ]
        );
        assert_eq!(rules.tiers(), TierMask::all());
    }

    #[test]
    fn semicolon_separates_only_without_pipes() {
        let records = vec![record(2, "T1", "A;B"), record(3, "T2", "C|D;E")];
        let rules = RuleSet::compile(&records, &Options::default());

        let codes = |id: &str| rules.territory(id).unwrap().tokens.iter().map(|t| t.to_string()).collect::<Vec<_>>();
        assert_eq!(codes("T1"), vec!["A", "B"]);
        assert_eq!(codes("T2"), vec!["C", "D;E"]);
    }

    #[test]
    fn numbers_coerce_to_zero_on_failure() {
        let rules = compile(
            "id,postcodes,population,businesses,income\n\
             T1,W1,\"12,000\",£300,£45000\n\
             T2,W2,n/a,-5,unknown\n\
             T3,W3,,1.9,\n",
        );

        let t1 = rules.territory("T1").unwrap();
        assert_eq!((t1.population, t1.business_count, t1.income.as_str()), (12000, 300, "£45000"));
        let t2 = rules.territory("T2").unwrap();
        assert_eq!((t2.population, t2.business_count, t2.income.as_str()), (0, 0, "unknown"));
        let t3 = rules.territory("T3").unwrap();
        assert_eq!((t3.population, t3.business_count), (0, 1));

        assert_eq!(
            rules.diagnostics(),
            &[Diagnostic::NumericCoercion { line: 3, field: Field::Population, raw: "n/a".into() }]
        );
    }

    #[test]
    fn status_defaults_to_available() {
        let rules = compile("id,postcodes,status\nA,W1,TAKEN\nB,W2,\nC,W3,reserved\nD,W4, Available \n");
        let status = |id: &str| rules.territory(id).unwrap().status.clone();
        assert_eq!(status("A"), Status::Taken);
        assert_eq!(status("B"), Status::Available);
        assert_eq!(status("C"), Status::Other("reserved".into()));
        assert_eq!(status("D"), Status::Available);
        assert!(!rules.territory("C").unwrap().is_taken());
    }

    #[test]
    fn colors_cycle_through_palette() {
        let options = Options { palette: vec!["#a".into(), "#b".into()], ..Options::default() };
        let records: Vec<Record> = ["T1", "T2", "T3"].iter().map(|id| record(2, id, "X")).collect();
        let rules = RuleSet::compile(&records, &options);

        let colors: Vec<&str> = rules.territories().iter().map(|t| t.color.as_str()).collect();
        assert_eq!(colors, vec!["#a", "#b", "#a"]);
    }

    #[test]
    fn empty_palette_falls_back_to_default() {
        let options = Options { palette: Vec::new(), ..Options::default() };
        let rules = RuleSet::compile(&[record(2, "T1", "X")], &options);
        assert_eq!(rules.territories()[0].color, crate::DEFAULT_PALETTE[0]);
    }

    #[test]
    fn skipped_rows_and_unreachable_territories_are_reported() {
        let rules = compile("id,postcodes\n,W1\nT1,\nT2,+\n");

        assert!(rules.territory("T1").is_some());
        assert_eq!(
            rules.diagnostics(),
            &[
                Diagnostic::RowSkipped { line: 2 },
                Diagnostic::MalformedToken { id: TerritoryId::new("T2"), raw: "+".into() },
                Diagnostic::UnreachableRule { id: TerritoryId::new("T1") },
                Diagnostic::UnreachableRule { id: TerritoryId::new("T2") },
            ]
        );
        assert_eq!(rules.tiers(), TierMask::empty());
    }

    #[test]
    fn duplicate_ids_take_later_slot_and_append_tokens() {
        let rules = compile("id,postcodes,region\nT1,W1,Old\nT2,N1,North\nT1,W2+,New\n");

        assert_eq!(rules.territories().len(), 2);
        let t1 = rules.territory("T1").unwrap();
        assert_eq!(t1.slot, 2);
        assert_eq!(t1.region, "New");
        assert_eq!(t1.color, crate::DEFAULT_PALETTE[2]);
        assert_eq!(rules.territory("T2").unwrap().color, crate::DEFAULT_PALETTE[1]);
        assert_eq!(rules.color_for("W1"), crate::DEFAULT_PALETTE[2]);
        assert_eq!(t1.tokens, vec![RawToken::Exact("W1".into()), RawToken::LetterContinuation("W2".into())]);
        assert_eq!(rules.diagnostics(), &[Diagnostic::DuplicateTerritory { id: TerritoryId::new("T1"), line: 4 }]);
    }

    #[test]
    fn exact_codes_keep_first_claim() {
        let rules = compile("id,postcodes\nT1,SE22|N1\nT2,se22|N2\n");

        assert_eq!(rules.exact.get("SE22"), Some(&0));
        assert_eq!(rules.exact_groups(), vec![(0, vec!["SE22", "N1"]), (1, vec!["N2"])]);
        assert_eq!(
            rules.diagnostics(),
            &[Diagnostic::ShadowedExact {
                code: "SE22".into(),
                kept: TerritoryId::new("T1"),
                shadowed: TerritoryId::new("T2"),
            }]
        );
    }

    #[test]
    fn metadata_reflects_declared_tokens() {
        let rules = compile(
            "territory_id,prefixes,region,pop,biz,avg_income,status\n\
             T2,EC1*|EC2,City,8000,900,£70000,taken\n",
        );
        let meta = rules.territory_metadata("T2").unwrap();

        assert_eq!(meta.region, "City");
        assert_eq!(meta.population, 8000);
        assert_eq!(meta.business_count, 900);
        assert_eq!(meta.income, "£70000");
        assert_eq!(meta.status, Status::Taken);
        assert_eq!(meta.tokens, vec!["EC1*", "EC2"]);
        assert!(rules.territory_metadata("T9").is_none());
    }
}
