//! Loading and classification engine.
//!
//! Everything a load does happens here, split into focused submodules under
//! `src/engine/`. Public paths stay flat (`crate::engine::RuleSet`,
//! `crate::engine::Expr`) so callers never reach into a submodule.
//!
//! ## How the parts work together
//!
//! ```text
//! text ── Table::resolve ─────────────┐   (schema.rs)
//!          - strip BOM                │
//!          - sniff delimiter          │
//!          - split RFC4180 rows       │
//!          - match header aliases     │
//!                                     v
//!                       RuleSet::compile    (compiled_rules.rs)
//!                         - classify tokens by marker
//!                         - exact table + ordered prefix lists
//!                         - palette slot, status, metrics
//!                         - Diagnostics (diagnostics.rs)
//!                                     │
//!                  ┌──────────────────┴──────────────────┐
//!                  v                                     v
//!        RuleSet::explain / classify            ExprBuilder::build
//!          (resolve.rs)                           (expr.rs)
//!          Exact → Letter+ → Any*                 same tiers, as an Expr tree
//! ```
//!
//! The rule set is built once per load and never mutated afterwards. A reload
//! builds a new one; swapping it in is the caller's business (see
//! [`crate::Atlas`]).
//!
//! ## Responsibilities by module
//!
//! - `schema.rs`: text to ordered `Record`s keyed by canonical `Field`.
//! - `compiled_rules.rs`: `Record`s to an immutable `RuleSet`.
//! - `diagnostics.rs`: non-fatal load conditions, collected and logged.
//! - `resolve.rs`: the three-tier precedence scan.
//! - `expr.rs`: the style expression AST, its builder and a direct interpreter.
//!
//! ## Debugging
//!
//! Every diagnostic is also emitted through `tracing`; the CLI reads its filter
//! from `DEMARC_LOG` (for example `DEMARC_LOG=demarc=debug`).

#[path = "engine/compiled_rules.rs"]
mod compiled_rules;
#[path = "engine/diagnostics.rs"]
mod diagnostics;
#[path = "engine/expr.rs"]
mod expr;
#[path = "engine/resolve.rs"]
mod resolve;
#[path = "engine/schema.rs"]
mod schema;

pub use compiled_rules::{PrefixRule, RuleSet, TerritoryMetadata, Tier, TierMask};
pub use diagnostics::Diagnostic;
pub use expr::{Branch, Expr, MatchArm, Value};
pub use resolve::Resolution;
pub use schema::{Field, Record, SchemaInvalid, Table};

pub(crate) use resolve::normalize_code;
