//! CLI entry point for `maildir2addr`.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use maildir2addr::config::{Config, ScanConfig};
use maildir2addr::exclude::ExclusionFilter;
use maildir2addr::scanner::MessageScanner;
use maildir2addr::session::{ScanSession, ScanStats};
use maildir2addr::store::AddressStore;

/// Harvest addresses and display names from maildir messages into a TSV
/// address book.
///
/// Without DIR arguments the address book is only reloaded, re-filtered
/// through the exclusion rules, and saved again.
#[derive(Parser)]
#[command(name = "maildir2addr", version, args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Maildir directories to scan recursively
    #[arg(value_name = "DIR")]
    roots: Vec<PathBuf>,

    /// Process spam messages (where X-Spam-Flag == YES)
    #[arg(short = 's', long)]
    include_spam: bool,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Address database input file
    #[arg(short, long, value_name = "FILE")]
    input: Option<PathBuf>,

    /// Address database output file
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Address exclusion regex file (one per line)
    #[arg(short, long, value_name = "FILE")]
    excludes: Option<PathBuf>,

    /// Do not load or create exclusion rules
    #[arg(long, conflicts_with = "excludes")]
    no_excludes: bool,

    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = maildir2addr::config::load_config();

    // Configure logging: stderr + optional log file
    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    match &cli.command {
        Some(Commands::Completions { shell }) => cmd_completions(*shell),
        Some(Commands::Manpage) => cmd_manpage(),
        None => cmd_scan(&cli, &config),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    // Try to set up file logging
    let log_dir = maildir2addr::config::cache_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender =
            tracing_appender::rolling::never(&log_dir, maildir2addr::config::LOG_FILE);
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        // Fall back to stderr only
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "maildir2addr", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}

/// Load the store and rules, scan the given roots, purge, and save.
fn cmd_scan(cli: &Cli, config: &Config) -> anyhow::Result<()> {
    let input = cli.input.clone().unwrap_or_else(|| config.addrs_in_path());
    let output = cli.output.clone().unwrap_or_else(|| config.addrs_out_path());
    let excludes = if cli.no_excludes {
        None
    } else {
        Some(cli.excludes.clone().unwrap_or_else(|| config.excludes_path()))
    };

    info!(path = %input.display(), "Loading addresses");
    let mut store = AddressStore::new();
    store
        .load_file(&input)
        .with_context(|| format!("load addrs {}", input.display()))?;

    let filter = match &excludes {
        Some(path) => load_exclusions(path)?,
        None => ExclusionFilter::empty(),
    };

    let scan_config = ScanConfig {
        include_spam: cli.include_spam || config.scan.include_spam,
        ..config.scan.clone()
    };
    let mut session = ScanSession::new(store, filter, MessageScanner::new(&scan_config));

    if !cli.roots.is_empty() {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} Scanning {pos} message(s) {wide_msg}")
                .expect("valid template"),
        );

        session.scan_roots(
            &cli.roots,
            Some(&|path: &Path| {
                pb.inc(1);
                if let Some(name) = path.file_name() {
                    pb.set_message(name.to_string_lossy().into_owned());
                }
            }),
        )?;

        pb.finish_and_clear();
    }

    session.purge_excluded();

    info!(path = %output.display(), "Saving addresses");
    session
        .save(&output)
        .with_context(|| format!("save addrs {}", output.display()))?;

    if cli.json {
        print_summary_json(&session.stats(), session.store().len(), &output)?;
    } else if !cli.roots.is_empty() {
        print_summary_table(&session.stats(), session.store().len(), &output);
    }

    Ok(())
}

/// Create the default rule file if needed, then compile it.
fn load_exclusions(path: &Path) -> anyhow::Result<ExclusionFilter> {
    ExclusionFilter::init_file(path)
        .with_context(|| format!("initialize exclusion rules {}", path.display()))?;
    info!(path = %path.display(), "Loading exclusion rules");
    let filter = ExclusionFilter::load_file(path)
        .with_context(|| format!("load exclusion rules {}", path.display()))?;
    Ok(filter)
}

/// Print the run summary in a human-readable table.
fn print_summary_table(stats: &ScanStats, total: usize, output: &Path) {
    println!();
    println!("  {:<24} {}", "Messages scanned", stats.scanned_msgs);
    println!("  {:<24} {}", "Messages skipped (spam)", stats.skipped_msgs);
    println!("  {:<24} {}", "Messages failed", stats.failed_msgs);
    println!("  {:<24} {}", "Addresses scanned", stats.scanned_addrs);
    println!("  {:<24} {}", "New addresses", stats.new_addrs);
    println!("  {:<24} {}", "Addresses stored", total);
    println!("  {:<24} {}", "Address book", output.display());
    println!();
}

/// Print the run summary as JSON.
fn print_summary_json(stats: &ScanStats, total: usize, output: &Path) -> anyhow::Result<()> {
    let summary = serde_json::json!({
        "stats": stats,
        "stored_addrs": total,
        "output": output.to_string_lossy(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
