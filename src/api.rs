use crate::engine::{RuleSet, Table};
use crate::{Result, TerritoryId};
use arc_swap::ArcSwap;
use chrono::{DateTime, Local};
use std::sync::Arc;

/// Default territory palette, assigned in registration order and cycled.
pub const DEFAULT_PALETTE: &[&str] = &[
    "#e41a1c", "#377eb8", "#4daf4a", "#984ea3", "#ff7f00", "#a65628", "#f781bf", "#66c2a5", "#fc8d62", "#8da0cb",
    "#e78ac3", "#a6d854",
];

/// Presentation values written into style expressions.
#[derive(Debug, Clone, PartialEq)]
pub struct Style {
    /// Fill for codes no territory owns.
    pub unmatched_color: String,
    pub normal_opacity: f64,
    /// Opacity for codes owned by a taken territory.
    pub dimmed_opacity: f64,
}

impl Default for Style {
    fn default() -> Self {
        Self { unmatched_color: "#d9d9d9".to_string(), normal_opacity: 0.7, dimmed_opacity: 0.2 }
    }
}

/// Options that affect compilation.
#[derive(Debug, Clone)]
pub struct Options {
    /// Territory colors. An empty palette falls back to [`DEFAULT_PALETTE`].
    pub palette: Vec<String>,
    pub style: Style,
}

impl Default for Options {
    fn default() -> Self {
        Self { palette: DEFAULT_PALETTE.iter().map(|c| c.to_string()).collect(), style: Style::default() }
    }
}

impl Options {
    pub(crate) fn palette(&self) -> Vec<String> {
        if self.palette.is_empty() {
            tracing::warn!("empty palette, using the default palette");
            DEFAULT_PALETTE.iter().map(|c| c.to_string()).collect()
        } else {
            self.palette.clone()
        }
    }
}

/// Compile `text` into a fresh rule set using default [`Options`].
///
/// # Example
/// ```
/// let rules = demarc::reload("id,postcodes\nT1,SE22|W1+\n").unwrap();
///
/// assert_eq!(rules.classify("w1a").map(|id| id.as_str()), Some("T1"));
/// assert_eq!(rules.classify("W12"), None);
/// ```
pub fn reload(text: &str) -> Result<RuleSet> {
    reload_with(text, &Options::default())
}

/// Compile `text` into a fresh rule set using the provided `options`.
///
/// Fails only when the header lacks a required column; every other problem
/// is recorded in [`RuleSet::diagnostics`].
pub fn reload_with(text: &str, options: &Options) -> Result<RuleSet> {
    let table = Table::resolve(text)?;
    Ok(RuleSet::compile(&table.records, options))
}

/// One published rule set.
#[derive(Debug)]
pub struct Generation {
    pub rules: Arc<RuleSet>,
    /// 0 for the initial empty rule set, then one more per successful reload.
    pub number: u64,
    pub loaded_at: DateTime<Local>,
}

/// Holder for the active rule set.
///
/// Readers take a snapshot with [`Atlas::current`] and keep using it for as
/// long as they like. [`Atlas::reload`] compiles a new rule set first and only
/// then publishes it with a single pointer swap, so no reader ever sees a
/// partially built rule set. A failed reload leaves the active one in place.
///
/// Concurrent reloads are ordered by a compare-and-swap on the active
/// generation, so generation numbers only ever grow and no successful reload
/// is overwritten by one that started earlier.
#[derive(Debug)]
pub struct Atlas {
    active: ArcSwap<Generation>,
    options: Options,
}

impl Atlas {
    /// Start with an empty rule set (every code unmatched).
    pub fn new(options: Options) -> Self {
        let initial = Generation { rules: Arc::new(RuleSet::empty(&options)), number: 0, loaded_at: Local::now() };
        Self { active: ArcSwap::from_pointee(initial), options }
    }

    pub fn current(&self) -> Arc<Generation> {
        self.active.load_full()
    }

    /// Classify against whichever rule set is active right now.
    pub fn classify(&self, code: &str) -> Option<TerritoryId> {
        self.active.load().rules.classify(code).cloned()
    }

    /// Compile `text` and, on success, make it the active rule set.
    pub fn reload(&self, text: &str) -> Result<Arc<Generation>> {
        let rules = match reload_with(text, &self.options) {
            Ok(rules) => rules,
            Err(err) => {
                let generation = self.active.load().number;
                tracing::warn!(error = %err, generation, "reload rejected, keeping active rules");
                return Err(err);
            }
        };

        let rules = Arc::new(rules);
        let generation = loop {
            let cur = self.active.load_full();
            let number = cur.number + 1;
            let next = Arc::new(Generation { rules: Arc::clone(&rules), number, loaded_at: Local::now() });
            let prev = self.active.compare_and_swap(&cur, Arc::clone(&next));
            if Arc::ptr_eq(&prev, &cur) {
                break next;
            }
        };

        tracing::info!(
            generation = generation.number,
            territories = generation.rules.territories().len(),
            diagnostics = generation.rules.diagnostics().len(),
            "rule set published"
        );
        Ok(generation)
    }
}

impl Default for Atlas {
    fn default() -> Self {
        Atlas::new(Options::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Field;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn reload_with_applies_style_options() {
        let options = Options {
            style: Style { unmatched_color: "#000".into(), ..Style::default() },
            ..Options::default()
        };
        let rules = reload_with("id,postcodes\nT1,W1\n", &options).unwrap();
        assert_eq!(rules.color_for("N1"), "#000");
        assert_eq!(rules.color_for("W1"), DEFAULT_PALETTE[0]);
    }

    #[test]
    fn reload_surfaces_schema_errors() {
        let err = reload("code,name\nW1,West\n").unwrap_err();
        assert_eq!(err.missing, vec![Field::Id, Field::Tokens]);
    }

    #[test]
    fn atlas_starts_empty() {
        let atlas = Atlas::default();
        let current = atlas.current();
        assert_eq!(current.number, 0);
        assert!(current.rules.is_empty());
        assert_eq!(atlas.classify("W1"), None);
    }

    #[test]
    fn atlas_swaps_whole_generations() {
        let atlas = Atlas::default();

        let first = atlas.reload("id,postcodes\nT1,W1+\n").unwrap();
        assert_eq!(first.number, 1);
        assert_eq!(atlas.classify("W1A"), Some(TerritoryId::new("T1")));

        let held = atlas.current();
        let second = atlas.reload("id,postcodes\nT2,W1+\n").unwrap();
        assert_eq!(second.number, 2);
        assert_eq!(atlas.classify("W1A"), Some(TerritoryId::new("T2")));

        // A snapshot taken before the swap still answers from its own rules.
        assert_eq!(held.rules.classify("W1A").map(TerritoryId::as_str), Some("T1"));
    }

    #[test]
    fn failed_reload_keeps_active_rules() {
        let atlas = Atlas::default();
        atlas.reload("id,postcodes\nT1,W1\n").unwrap();

        assert!(atlas.reload("region\nLondon\n").is_err());
        let current = atlas.current();
        assert_eq!(current.number, 1);
        assert_eq!(atlas.classify("W1"), Some(TerritoryId::new("T1")));
    }

    #[test]
    fn concurrent_reloads_publish_monotonic_complete_generations() {
        const WRITERS: usize = 2;
        const RELOADS: usize = 25;

        let atlas = Atlas::default();
        let done = AtomicBool::new(false);

        std::thread::scope(|s| {
            for _ in 0..2 {
                s.spawn(|| {
                    let mut last = 0;
                    while !done.load(Ordering::Acquire) {
                        let current = atlas.current();
                        assert!(current.number >= last, "generation went from {last} to {}", current.number);
                        last = current.number;
                        if current.number > 0 {
                            // Every published table gives W1 and N1A to the same territory.
                            let exact = current.rules.classify("W1");
                            assert!(exact.is_some());
                            assert_eq!(exact, current.rules.classify("N1A"));
                        }
                    }
                });
            }

            let writers: Vec<_> = (0..WRITERS)
                .map(|w| {
                    let atlas = &atlas;
                    s.spawn(move || {
                        for i in 0..RELOADS {
                            let text = format!("id,postcodes\nT{w}_{i},W1|N1+\n");
                            atlas.reload(&text).unwrap();
                        }
                    })
                })
                .collect();
            for writer in writers {
                writer.join().unwrap();
            }
            done.store(true, Ordering::Release);
        });

        assert_eq!(atlas.current().number, (WRITERS * RELOADS) as u64);
    }
}
