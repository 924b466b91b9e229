use demarc::{RuleSet, Tier};

mod ansi {
    pub const RESET: &str = "\x1b[0m";
    pub const DIM: &str = "\x1b[2m";
    pub const BOLD: &str = "\x1b[1m";

    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const BLUE: &str = "\x1b[34m";
    pub const CYAN: &str = "\x1b[36m";
    pub const GRAY: &str = "\x1b[90m";
}

pub struct Palette {
    enabled: bool,
}

impl Palette {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    fn paint(&self, s: impl AsRef<str>, color: &str) -> String {
        if self.enabled { format!("{}{}{}", color, s.as_ref(), ansi::RESET) } else { s.as_ref().to_string() }
    }

    fn bold(&self, s: impl AsRef<str>) -> String {
        self.paint(s, ansi::BOLD)
    }

    fn dim(&self, s: impl AsRef<str>) -> String {
        self.paint(s, ansi::DIM)
    }
}

fn tier_label(tier: Tier) -> &'static str {
    match tier {
        Tier::Exact => "exact",
        Tier::LetterContinuation => "letter+",
        Tier::AnyContinuation => "any*",
    }
}

pub fn print_summary(path: &str, rules: &RuleSet, palette: &Palette) {
    println!("\n{}", palette.bold(palette.paint(format!("⚙  Territories: {path}"), ansi::CYAN)));

    println!("\n{}", palette.paint("━━━ Territories ━━━", ansi::GRAY));
    if rules.is_empty() {
        println!("{}", palette.dim("  No territories"));
    }
    for t in rules.territories() {
        let status =
            if t.is_taken() { palette.dim(t.status.label()) } else { palette.paint(t.status.label(), ansi::GREEN) };
        println!(
            "  {} {} {} {} {}",
            palette.paint(format!("[{}]", t.slot), ansi::GRAY),
            palette.bold(t.id.as_str()),
            palette.paint(&t.color, ansi::BLUE),
            status,
            palette.dim(&t.region),
        );
        let tokens: Vec<String> = t.tokens.iter().map(|tok| tok.to_string()).collect();
        println!(
            "      {} {}  {} {}  {} {}  {} {}",
            palette.dim("tokens:"),
            palette.paint(tokens.join(" "), ansi::CYAN),
            palette.dim("pop:"),
            t.population,
            palette.dim("biz:"),
            t.business_count,
            palette.dim("income:"),
            t.income,
        );
    }

    let exact = rules.territories().iter().flat_map(|t| &t.tokens).filter(|tok| tok.tier() == Tier::Exact).count();
    println!("\n{}", palette.paint("━━━ Rules ━━━", ansi::GRAY));
    println!(
        "  Exact: {}  │  Letter+: {}  │  Any*: {}",
        palette.paint(exact.to_string(), ansi::GREEN),
        palette.paint(rules.letter_rules().len().to_string(), ansi::GREEN),
        palette.paint(rules.any_rules().len().to_string(), ansi::GREEN),
    );

    if !rules.diagnostics().is_empty() {
        println!("\n{}", palette.paint("━━━ Diagnostics ━━━", ansi::GRAY));
        for diagnostic in rules.diagnostics() {
            println!("  {} {}", palette.paint("•", ansi::YELLOW), diagnostic);
        }
    }
    println!();
}

pub fn print_lookups(rules: &RuleSet, codes: &[String], palette: &Palette) {
    println!("\n{}", palette.paint("━━━ Lookups ━━━", ansi::GRAY));
    for code in codes {
        match rules.explain(code) {
            Some(hit) => {
                let owner = palette.bold(palette.paint(hit.territory.id.as_str(), ansi::GREEN));
                let dimmed = if hit.territory.is_taken() { palette.dim(" (taken)") } else { String::new() };
                println!(
                    "  {} {} {}{}  {} {} {}",
                    palette.paint(code, ansi::YELLOW),
                    palette.dim("→"),
                    owner,
                    dimmed,
                    palette.dim("│ rule:"),
                    palette.paint(hit.rule, ansi::CYAN),
                    palette.dim(format!("({})", tier_label(hit.tier))),
                );
            }
            None => {
                let code = palette.paint(code, ansi::YELLOW);
                println!("  {} {} {}", code, palette.dim("→"), palette.dim("no territory"));
            }
        }
    }
    println!();
}

/// One lookup as a JSON line: the code, its owner's metadata and the deciding rule.
pub fn lookup_json(rules: &RuleSet, code: &str) -> serde_json::Value {
    match rules.explain(code) {
        Some(hit) => serde_json::json!({
            "code": code,
            "territory": rules.territory_metadata(hit.territory.id.as_str()),
            "tier": hit.tier,
            "rule": hit.rule,
            "color": hit.territory.color,
            "opacity": rules.opacity_for(code),
        }),
        None => serde_json::json!({
            "code": code,
            "territory": null,
            "color": rules.style().unmatched_color,
            "opacity": rules.style().normal_opacity,
        }),
    }
}
