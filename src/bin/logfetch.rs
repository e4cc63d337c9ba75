use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use logfetch::app::LogFetcher;
use logfetch::config::{ConfigLoader, ResolvedConfig};
use logfetch::domain::{FetchRequest, FetchResult, ItemOutcome};
use logfetch::error::FetchError;
use logfetch::output::{FetchResponse, JsonOutput, write_response};
use logfetch::ssh::SshConnector;
use logfetch::store::ActivityStore;

#[derive(Parser)]
#[command(name = "logfetch")]
#[command(about = "Pull device log tails by IMEI from remote benches over SSH")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Fetch log tails for one or more IMEIs")]
    Fetch(FetchArgs),
    #[command(about = "List configured bench aliases")]
    Hosts,
    #[command(about = "Show recent activity records")]
    Activity(ActivityArgs),
}

#[derive(Args)]
struct FetchArgs {
    #[arg(long)]
    alias: String,

    #[arg(long)]
    dir: String,

    /// Comma or newline separated IMEIs
    #[arg(long, conflicts_with = "imeis_file")]
    imeis: Option<String>,

    #[arg(long)]
    imeis_file: Option<PathBuf>,

    #[arg(long, default_value = ".")]
    out: String,

    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct ActivityArgs {
    #[arg(long)]
    limit: Option<usize>,
}

#[derive(Serialize)]
struct FetchSummary<'a> {
    path: String,
    content_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    files: Option<&'a [ItemOutcome]>,
}

#[derive(Serialize)]
struct HostSummary<'a> {
    alias: &'a str,
    host: &'a str,
    username: &'a str,
    port: u16,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<FetchError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &FetchError) -> u8 {
    match error {
        FetchError::MissingField(_)
        | FetchError::EmptyIdentifiers
        | FetchError::InvalidIdentifier(_)
        | FetchError::AliasNotFound(_)
        | FetchError::NotFound { .. }
        | FetchError::NoFilesFound { .. }
        | FetchError::MissingConfig => 2,
        FetchError::Transport(_) | FetchError::FetchFailure { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ConfigLoader::resolve(cli.config.as_deref())?;

    match cli.command {
        Commands::Fetch(args) => run_fetch(args, config),
        Commands::Hosts => run_hosts(&config),
        Commands::Activity(args) => run_activity(args, &config),
    }
}

fn activity_store(config: &ResolvedConfig) -> Result<ActivityStore, FetchError> {
    match &config.activity_log {
        Some(path) => Utf8PathBuf::from_path_buf(path.clone())
            .map(ActivityStore::new_with_path)
            .map_err(|path| {
                FetchError::Filesystem(format!("non-utf8 activity log path {}", path.display()))
            }),
        None => ActivityStore::new(),
    }
}

fn run_fetch(args: FetchArgs, config: ResolvedConfig) -> miette::Result<()> {
    let store = activity_store(&config)?;
    let raw_identifiers = match (&args.imeis, &args.imeis_file) {
        (Some(text), _) => text.clone(),
        (None, Some(path)) => fs::read_to_string(path)
            .map_err(|err| FetchError::Filesystem(format!("read {}: {err}", path.display())))?,
        (None, None) => String::new(),
    };

    let fetcher = LogFetcher::new(SshConnector::new(), config.hosts, config.tail_lines);
    let outcome = FetchRequest::new(&args.alias, &args.dir, &raw_identifiers)
        .and_then(|request| fetcher.fetch(&request, &store));

    let result = match outcome {
        Ok(result) => result,
        Err(err) => {
            if args.json {
                JsonOutput::print_error(&err).into_diagnostic()?;
            } else if let FetchError::NoFilesFound { ledger } = &err {
                print_ledger(ledger);
            }
            return Err(err.into());
        }
    };

    let ledger = match &result {
        FetchResult::Bundle(bundle) => Some(bundle.ledger.clone()),
        FetchResult::Single(_) => None,
    };
    let response = FetchResponse::from(result);
    let path = write_response(&Utf8PathBuf::from(args.out.as_str()), &response)?;

    if args.json {
        JsonOutput::print_json(&FetchSummary {
            path: path.to_string(),
            content_type: response.content_type,
            files: ledger.as_deref(),
        })
        .into_diagnostic()?;
    } else {
        println!("saved {} ({})", path, response.content_type);
        if let Some(ledger) = &ledger {
            print_ledger(ledger);
        }
    }
    Ok(())
}

fn print_ledger(ledger: &[ItemOutcome]) {
    let green = "\x1b[32m";
    let red = "\x1b[31m";
    let reset = "\x1b[0m";

    for outcome in ledger {
        if outcome.is_success() {
            println!("{green}ok    {}{reset}", outcome.identifier);
        } else {
            println!(
                "{red}error {} ({}){reset}",
                outcome.identifier,
                outcome.reason.as_deref().unwrap_or("unknown").trim_end()
            );
        }
    }
}

fn run_hosts(config: &ResolvedConfig) -> miette::Result<()> {
    let hosts = config
        .hosts
        .aliases()
        .map(|(alias, profile)| HostSummary {
            alias,
            host: &profile.host,
            username: &profile.username,
            port: profile.port,
        })
        .collect::<Vec<_>>();
    JsonOutput::print_json(&hosts).into_diagnostic()
}

fn run_activity(args: ActivityArgs, config: &ResolvedConfig) -> miette::Result<()> {
    let store = activity_store(config)?;
    let entries = store.recent(args.limit.unwrap_or(config.recent_activity))?;
    JsonOutput::print_json(&entries).into_diagnostic()
}
