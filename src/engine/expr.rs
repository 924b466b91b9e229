//! Style expressions.
//!
//! A rendering layer wants declarative paint rules ("color this feature by
//! its postcode"), not a callback into the classifier. This module renders a
//! [`RuleSet`] into a small tagged AST that any renderer can translate into
//! its own expression language. The tree encodes exactly the precedence of
//! [`RuleSet::classify`]:
//!
//! ```text
//! match code in exact table            (omitted when the tier is empty)
//!   [SE22, N1]  -> out(T1)
//!   [EC1A]      -> out(T2)
//!   else case                          (letter tier, declaration order)
//!     prefix W1 && (len == 2 || code[2] in A–Z) -> out(T1)
//!     ...
//!     else case                        (any tier, declaration order)
//!       prefix EC1 -> out(T2)
//!       ...
//!       else unmatched
//! ```
//!
//! `out(T)` is the territory's color, opacity or id depending on which tree is
//! built. The builder only emits trees. [`Expr::evaluate`] is a direct
//! interpreter used to check trees against the classifier and by callers that
//! want to preview a tree without a renderer.
//!
//! Lengths and indexes count characters, not bytes. [`Expr::Code`] stands for
//! the feature's code trimmed and upper-cased, the same normalization the
//! classifier applies.

use super::compiled_rules::{PrefixRule, RuleSet};
use super::normalize_code;
use crate::Territory;
use serde::Serialize;

/// Letters accepted right after a letter-continuation prefix.
pub const CONTINUATION_LETTERS: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Scalar produced by an expression.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    fn is_true(&self) -> bool {
        matches!(self, Value::Bool(true))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

/// One row of an exact-match table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchArm {
    pub labels: Vec<String>,
    pub output: Expr,
}

/// One condition/output pair of an ordered conditional.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Branch {
    pub when: Expr,
    pub then: Expr,
}

/// Renderer-agnostic expression tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Expr {
    /// The feature's postcode code, normalized.
    Code,
    Literal { value: Value },
    /// Exact-match table: first arm whose labels contain `input`, else `fallback`.
    Match { input: Box<Expr>, arms: Vec<MatchArm>, fallback: Box<Expr> },
    /// Ordered conditional list: first branch whose condition holds.
    Case { branches: Vec<Branch>, fallback: Box<Expr> },
    /// `input` starts with `prefix`.
    HasPrefix { input: Box<Expr>, prefix: String },
    /// `input` is exactly `length` characters long.
    LengthEq { input: Box<Expr>, length: usize },
    /// The character at `index` of `input` exists and is one of `letters`.
    LetterAt { input: Box<Expr>, index: usize, letters: String },
    All { of: Vec<Expr> },
    Any { of: Vec<Expr> },
}

impl Expr {
    pub fn literal(value: impl Into<Value>) -> Expr {
        Expr::Literal { value: value.into() }
    }

    /// Evaluate the tree for one code.
    pub fn evaluate(&self, code: &str) -> Value {
        self.eval(&normalize_code(code))
    }

    fn eval(&self, code: &str) -> Value {
        match self {
            Expr::Code => Value::Text(code.to_string()),
            Expr::Literal { value } => value.clone(),
            Expr::Match { input, arms, fallback } => {
                let key = input.eval(code);
                let hit = key.as_str().and_then(|key| arms.iter().find(|arm| arm.labels.iter().any(|l| l == key)));
                match hit {
                    Some(arm) => arm.output.eval(code),
                    None => fallback.eval(code),
                }
            }
            Expr::Case { branches, fallback } => match branches.iter().find(|b| b.when.eval(code).is_true()) {
                Some(branch) => branch.then.eval(code),
                None => fallback.eval(code),
            },
            Expr::HasPrefix { input, prefix } => {
                Value::Bool(input.eval(code).as_str().is_some_and(|s| s.starts_with(prefix.as_str())))
            }
            Expr::LengthEq { input, length } => {
                Value::Bool(input.eval(code).as_str().is_some_and(|s| s.chars().count() == *length))
            }
            Expr::LetterAt { input, index, letters } => Value::Bool(
                input.eval(code).as_str().and_then(|s| s.chars().nth(*index)).is_some_and(|c| letters.contains(c)),
            ),
            Expr::All { of } => Value::Bool(of.iter().all(|e| e.eval(code).is_true())),
            Expr::Any { of } => Value::Bool(of.iter().any(|e| e.eval(code).is_true())),
        }
    }
}

/// Builds expression trees from a rule set, one output per territory.
pub(crate) struct ExprBuilder<'a> {
    rules: &'a RuleSet,
}

impl<'a> ExprBuilder<'a> {
    pub fn new(rules: &'a RuleSet) -> Self {
        ExprBuilder { rules }
    }

    /// Nest the tiers inside out: any-continuation innermost, exact outermost.
    pub fn build(&self, output: impl Fn(&Territory) -> Value, unmatched: Value) -> Expr {
        let rules = self.rules;
        let mut expr = Expr::literal(unmatched);

        if !rules.any.is_empty() {
            expr = self.case(&rules.any, any_continuation, &output, expr);
        }

        if !rules.letter.is_empty() {
            expr = self.case(&rules.letter, letter_continuation, &output, expr);
        }

        let groups = rules.exact_groups();
        if !groups.is_empty() {
            let arms = groups
                .into_iter()
                .map(|(idx, codes)| MatchArm {
                    labels: codes.into_iter().map(str::to_string).collect(),
                    output: Expr::literal(output(&rules.territories[idx])),
                })
                .collect();
            expr = Expr::Match { input: Box::new(Expr::Code), arms, fallback: Box::new(expr) };
        }

        expr
    }

    fn case(
        &self,
        tier: &[PrefixRule],
        condition: fn(&str) -> Expr,
        output: &impl Fn(&Territory) -> Value,
        fallback: Expr,
    ) -> Expr {
        let branches = tier
            .iter()
            .map(|rule| Branch {
                when: condition(&rule.prefix),
                then: Expr::literal(output(self.rules.owner_of(rule))),
            })
            .collect();
        Expr::Case { branches, fallback: Box::new(fallback) }
    }
}

fn any_continuation(prefix: &str) -> Expr {
    Expr::HasPrefix { input: Box::new(Expr::Code), prefix: prefix.to_string() }
}

fn letter_continuation(prefix: &str) -> Expr {
    let len = prefix.chars().count();
    Expr::All {
        of: vec![
            any_continuation(prefix),
            Expr::Any {
                of: vec![
                    Expr::LengthEq { input: Box::new(Expr::Code), length: len },
                    Expr::LetterAt {
                        input: Box::new(Expr::Code),
                        index: len,
                        letters: CONTINUATION_LETTERS.to_string(),
                    },
                ],
            },
        ],
    }
}

impl RuleSet {
    /// Owner's color, or the style's unmatched color.
    pub fn color_expression(&self) -> Expr {
        ExprBuilder::new(self)
            .build(|t| Value::from(t.color.as_str()), Value::from(self.style.unmatched_color.as_str()))
    }

    /// Dimmed opacity when the owner is taken, normal otherwise.
    pub fn opacity_expression(&self) -> Expr {
        let style = &self.style;
        ExprBuilder::new(self).build(
            |t| Value::from(if t.is_taken() { style.dimmed_opacity } else { style.normal_opacity }),
            Value::from(style.normal_opacity),
        )
    }

    /// Owner's id, or null.
    pub fn owner_expression(&self) -> Expr {
        ExprBuilder::new(self).build(|t| Value::from(t.id.as_str()), Value::Null)
    }
}
