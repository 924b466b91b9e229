mod report;

use demarc::{Expr, Options, RuleSet, reload_with};
use std::io::{self, IsTerminal};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

const LOG_ENV: &str = "DEMARC_LOG";

fn main() {
    init_logging();

    let config = match parse_args() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(2);
        }
    };

    let rules = match load(&config.path) {
        Ok(rules) => rules,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    };

    if let Some(kind) = config.expr {
        let expr = kind.build(&rules);
        match serde_json::to_string_pretty(&expr) {
            Ok(json) => println!("{json}"),
            Err(err) => {
                eprintln!("error: failed to serialize expression: {err}");
                std::process::exit(1);
            }
        }
        return;
    }

    if config.json {
        for code in &config.codes {
            let line = report::lookup_json(&rules, code);
            println!("{line}");
        }
        return;
    }

    let palette = report::Palette::new(config.color);
    if config.list || config.codes.is_empty() {
        report::print_summary(&config.path, &rules, &palette);
    }
    if !config.codes.is_empty() {
        report::print_lookups(&rules, &config.codes, &palette);
    }
}

fn init_logging() {
    let filter =
        EnvFilter::builder().with_default_directive(LevelFilter::WARN.into()).with_env_var(LOG_ENV).from_env_lossy();
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).with_target(false).init();
}

fn load(path: &str) -> Result<RuleSet, String> {
    let text = std::fs::read_to_string(path).map_err(|err| format!("error: failed to read '{path}': {err}"))?;
    reload_with(&text, &Options::default()).map_err(|err| format!("error: {path}: {err}"))
}

#[derive(Debug, Clone, Copy)]
enum ExprKind {
    Color,
    Opacity,
    Owner,
}

impl ExprKind {
    fn parse(value: &str) -> Result<Self, String> {
        match value {
            "color" => Ok(ExprKind::Color),
            "opacity" => Ok(ExprKind::Opacity),
            "owner" => Ok(ExprKind::Owner),
            _ => Err(format!("error: invalid --expr '{value}' (expected color, opacity or owner)")),
        }
    }

    fn build(self, rules: &RuleSet) -> Expr {
        match self {
            ExprKind::Color => rules.color_expression(),
            ExprKind::Opacity => rules.opacity_expression(),
            ExprKind::Owner => rules.owner_expression(),
        }
    }
}

struct CliConfig {
    path: String,
    codes: Vec<String>,
    expr: Option<ExprKind>,
    list: bool,
    json: bool,
    color: bool,
}

fn parse_args() -> Result<CliConfig, String> {
    let mut path: Option<String> = None;
    let mut codes = Vec::new();
    let mut expr = None;
    let mut list = false;
    let mut json = false;
    let mut color = io::stdout().is_terminal();
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-V" | "--version" => {
                println!("demarc {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--color" => color = true,
            "--no-color" => color = false,
            "--list" | "-l" => list = true,
            "--json" => json = true,
            "--expr" => {
                let value = args.next().ok_or_else(|| "error: --expr expects a value".to_string())?;
                expr = Some(ExprKind::parse(&value)?);
            }
            "--" => {
                for rest in args.by_ref() {
                    if path.is_none() {
                        path = Some(rest);
                    } else {
                        codes.push(rest);
                    }
                }
                break;
            }
            _ if arg.starts_with("--expr=") => {
                expr = Some(ExprKind::parse(arg.trim_start_matches("--expr="))?);
            }
            _ if arg.starts_with('-') => {
                return Err(format!("error: unknown option '{arg}'"));
            }
            _ if path.is_none() => path = Some(arg),
            _ => codes.push(arg),
        }
    }

    let Some(path) = path else {
        return Err(format!("error: no file provided\n\n{}", help_text()));
    };

    if json && codes.is_empty() {
        return Err("error: --json needs at least one code".to_string());
    }

    Ok(CliConfig { path, codes, expr, list, json, color })
}

fn print_help() {
    println!("{}", help_text());
}

fn help_text() -> String {
    format!(
        "demarc {version}

Postcode-district territory classifier.

Usage:
  demarc [OPTIONS] [--] <file> [CODE...]

With no codes, prints a summary of the territories in <file>. With codes,
prints which territory owns each one and which rule decided it.

Options:
  -l, --list            Print the territory summary even when codes are given.
  --expr <kind>         Print the color, opacity or owner style expression as JSON.
  --json                Print one JSON object per code instead of a report.
  --color               Force ANSI color output.
  --no-color            Disable ANSI color output.
  -h, --help            Show this help message.
  -V, --version         Print version information.

Environment:
  {log_env}            Log filter (e.g. demarc=debug). Default: warn.

Exit codes:
  0  Success.
  1  File could not be read or its header is invalid.
  2  Invalid arguments.
",
        version = env!("CARGO_PKG_VERSION"),
        log_env = LOG_ENV,
    )
}
