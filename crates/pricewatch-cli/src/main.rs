//! Pricewatch CLI: entry point.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use pricewatch::{catalog, price_shift, Currency, Money, ScanContext, ScanTarget, Scanner};
use pricewatch_cli::output;
use pricewatch_cli::prompt::fallback_gate;
use pricewatch_cli::{load_settings, parse_money};

#[derive(Parser)]
#[command(
    name = "pricewatch",
    about = "Pricewatch: scan shop pages and normalize prices to one currency",
    version
)]
struct Cli {
    /// Path to a JSON settings file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,

    /// Use the local rate file without asking when a rate cannot be downloaded.
    #[arg(short = 'y', long, global = true)]
    allow_rate_file: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the built-in shop plans.
    Shops {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Fetch and parse product pages with one shop plan.
    Scan {
        /// Shop name or id (see `pricewatch shops`).
        #[arg(short, long)]
        shop: String,

        /// Page addresses, relative to the shop domain or absolute.
        /// The shop's front page when omitted.
        uris: Vec<String>,

        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Exchange rate between two currencies.
    Rate {
        from: Currency,
        to: Currency,
    },

    /// Relative deviation of a current price from a general one.
    ///
    /// Examples:
    ///   pricewatch shift "100 USD" "110 USD"
    ///   pricewatch shift 90EUR 2400UAH
    Shift {
        #[arg(value_parser = parse_money)]
        general: Money,

        #[arg(value_parser = parse_money)]
        current: Money,
    },

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   pricewatch completions bash > ~/.local/share/bash-completion/completions/pricewatch
    ///   pricewatch completions zsh > ~/.zfunc/_pricewatch
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Shops { json } => {
            let plans = catalog::builtin_plans()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&output::shops_json(&plans))?);
            } else {
                print!("{}", output::render_shops(&plans));
            }
        }

        Commands::Scan { shop, uris, json } => {
            let plan = catalog::builtin_plans()?
                .into_iter()
                .find(|p| catalog::matches(p, &shop))
                .map(Arc::new)
                .with_context(|| format!("unknown shop '{shop}', see `pricewatch shops`"))?;

            let scanner = build_scanner(&cli.config, cli.allow_rate_file)?;
            let targets: Vec<ScanTarget> = if uris.is_empty() {
                vec![ScanTarget::new(plan, None)]
            } else {
                uris.into_iter()
                    .map(|u| ScanTarget::new(plan.clone(), Some(u)))
                    .collect()
            };

            let outcomes = scanner.scan_many(targets).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&output::outcomes_json(&outcomes))?);
            } else {
                for outcome in &outcomes {
                    print!("{}", output::render_outcome(outcome));
                }
            }
            if outcomes.iter().any(|o| o.result.is_err()) {
                std::process::exit(1);
            }
        }

        Commands::Rate { from, to } => {
            let scanner = build_scanner(&cli.config, cli.allow_rate_file)?;
            let rate = scanner.context().rates.rate_for(to, from).await?;
            println!("1 {from} = {} {to}", rate.round_dp(4));
        }

        Commands::Shift { general, current } => {
            let scanner = build_scanner(&cli.config, cli.allow_rate_file)?;
            let rates = &scanner.context().rates;
            rates.ensure_all([general.currency, current.currency]).await?;

            let shift = price_shift(Some(&general), Some(&current), rates.as_ref())?;
            println!("{}", output::render_shift(shift));
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "pricewatch", &mut std::io::stdout());
        }
    }

    Ok(())
}

/// Scanner over resolved settings, cancelled on Ctrl-C.
fn build_scanner(config: &Option<PathBuf>, allow_rate_file: bool) -> anyhow::Result<Scanner> {
    let settings = load_settings(config.as_deref()).context("failed to load settings")?;
    tracing::debug!(data_dir = %settings.data_dir.display(), "settings resolved");

    let ctx = ScanContext::from_settings(settings, fallback_gate(allow_rate_file))?;

    let cancel = ctx.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling pending downloads");
            cancel.cancel();
        }
    });

    Ok(Scanner::new(Arc::new(ctx)))
}
