use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use std::io::BufRead;

use extract::{Extractor, SaleGrammar};
use source::{ChatExportSource, MessageSource};

mod aggregate;
mod config;
mod extract;
mod identity;
mod pipeline;
mod render;
mod report;
mod source;
mod types;
mod utils;
mod windows;

#[derive(Parser)]
#[command(name = "marketstat")]
#[command(version)]
#[command(disable_help_subcommand = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Output the report as JSON instead of tables
    #[arg(long)]
    json: bool,

    /// Pretty-print JSON instead of a single line
    #[arg(long, requires = "json")]
    pretty: bool,

    /// Directory with ChatExport_* folders (overrides the configured one)
    #[arg(long)]
    base_dir: Option<String>,

    /// Reference time for the day/week/month windows, "DD.MM.YYYY HH:MM:SS" (default: now)
    #[arg(long)]
    at: Option<String>,

    /// Use comma-separated number formatting
    #[arg(long)]
    number_comma: bool,

    /// Locale for number formatting (en, de, fr, es, it, ja, ko, ru, zh)
    #[arg(long)]
    locale: Option<String>,

    /// Number of decimal places for amounts
    #[arg(long)]
    decimal_places: Option<usize>,

    /// Wait for Enter before exiting
    #[arg(long)]
    pause: bool,

    /// More log output (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// List every item name seen in the latest export
    Items,
    /// Manage configuration
    Config(ConfigArgs),
}

#[derive(Args)]
struct ConfigArgs {
    #[command(subcommand)]
    subcommand: ConfigSubcommands,
}

#[derive(Subcommand)]
enum ConfigSubcommands {
    /// Create default configuration file
    Init {
        #[arg(long, default_value_t = false)]
        overwrite: bool,
    },
    /// Show current configuration
    Show,
    /// Set configuration value
    Set {
        /// Configuration key (base-dir, selected-items, add-item, remove-item, timezone, number-comma, locale, decimal-places)
        key: String,
        /// Configuration value
        value: String,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match &cli.command {
        None => run_report(&cli),
        Some(Commands::Items) => run_items(&cli),
        Some(Commands::Config(config_args)) => handle_config_subcommand(config_args),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        pause_if_requested(cli.pause);
        std::process::exit(1);
    }
    pause_if_requested(cli.pause);
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn pause_if_requested(pause: bool) {
    if pause {
        println!();
        println!("Press Enter to exit...");
        let _ = std::io::stdin().lock().read_line(&mut String::new());
    }
}

fn build_extractor(config: &config::Config) -> Result<Extractor> {
    Ok(
        Extractor::new(SaleGrammar::DEFAULT, config.timezone())?
            .with_aliases(config.report.aliases.clone()),
    )
}

fn run_report(cli: &Cli) -> Result<()> {
    let config = config::load_or_collect(cli.base_dir.as_deref())?;

    let format_options = utils::NumberFormatOptions {
        use_comma: cli.number_comma || config.formatting.number_comma,
        locale: cli
            .locale
            .clone()
            .unwrap_or_else(|| config.formatting.locale.clone()),
        decimal_places: cli
            .decimal_places
            .unwrap_or(config.formatting.decimal_places),
    };

    let extractor = build_extractor(&config)?;
    let reference = match &cli.at {
        Some(at) => extract::parse_timestamp(at, extractor.timezone())
            .with_context(|| format!("Invalid --at time: {at}"))?,
        None => chrono::Utc::now(),
    };

    let source = ChatExportSource::new(&config.export.base_dir);
    let export = source.latest_export()?;
    let messages = source
        .read_export(&export)
        .with_context(|| format!("Failed to read {}", source.display_name()))?;

    let analysis = pipeline::analyze(
        &extractor,
        &messages,
        reference,
        &windows::default_windows(),
        &config.report.selected_items,
    );

    let output = render::ReportOutput {
        reference_time: reference,
        export: Some(export.path.display().to_string()),
        rows: &analysis.rows,
        known_items: &analysis.known_items,
        diagnostics: &analysis.diagnostics,
    };

    if cli.json {
        println!("{}", render::render_json(&output, cli.pretty)?);
    } else {
        let stdout = std::io::stdout();
        render::render_text(&mut stdout.lock(), &output, &format_options)?;
    }

    Ok(())
}

fn run_items(cli: &Cli) -> Result<()> {
    let mut config = config::Config::load()?.unwrap_or_default();
    if let Some(dir) = &cli.base_dir {
        config.set_base_dir(dir);
    }
    if config.export.base_dir.is_empty() {
        anyhow::bail!("No base directory configured. Run `marketstat config set base-dir <dir>`");
    }

    let extractor = build_extractor(&config)?;
    let messages = ChatExportSource::new(&config.export.base_dir).read_messages()?;
    let (sales, _) = extractor.extract_all(&messages);

    for item in report::known_items(&sales) {
        println!("{item}");
    }
    Ok(())
}

fn handle_config_subcommand(config_args: &ConfigArgs) -> Result<()> {
    match &config_args.subcommand {
        ConfigSubcommands::Init { overwrite } => config::create_default_config(*overwrite)
            .context("Error creating config"),
        ConfigSubcommands::Show => config::show_config().context("Error showing config"),
        ConfigSubcommands::Set { key, value } => {
            config::set_config_value(key, value).context("Error setting config")
        }
    }
}
