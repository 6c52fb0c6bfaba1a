use anyhow::{anyhow, Result};
use azkv::azure::auth::{self, AzureCredentials};
use azkv::azure::client::ArmClient;
use azkv::azure::http::{error_hint, ArmHttpClient};
use azkv::config::{CloudEnvironment, Config};
use azkv::keyvault::facts;
use azkv::keyvault::{DesiredConfig, Reconciler, State};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Converge an Azure Key Vault to a declared state
#[derive(Parser, Debug)]
#[command(name = "azkv", version = azkv::VERSION, about, long_about = None)]
struct Args {
    /// Azure subscription to operate in
    #[arg(short, long, global = true)]
    subscription_id: Option<String>,

    /// Section of ~/.azure/credentials to use
    #[arg(long, global = true)]
    profile: Option<String>,

    /// Azure cloud environment
    #[arg(long, value_enum, global = true)]
    cloud: Option<CloudEnvironment>,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create, update or delete a vault to match a desired-state file
    Apply {
        /// YAML or JSON desired-state file
        #[arg(short, long)]
        file: PathBuf,

        /// Report what would change without changing anything
        #[arg(long)]
        check: bool,

        /// Override the file's lifecycle state
        #[arg(long, value_enum)]
        state: Option<State>,
    },
    /// Show one vault, or every vault in a resource group
    Show {
        #[arg(short, long)]
        resource_group: String,

        #[arg(short, long)]
        vault_name: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

// stdout carries the JSON result, so logs go to a file
fn setup_logging(level: LogLevel) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let tracing_level = level.to_tracing_level()?;

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Cannot open log file {}: {}", log_path.display(), e);
            return None;
        }
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("azkv {} started with log level: {:?}", azkv::VERSION, level);
    tracing::info!("Log file: {:?}", log_path);

    Some(guard)
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("azkv").join("azkv.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".azkv").join("azkv.log");
    }
    PathBuf::from("azkv.log")
}

#[derive(Serialize)]
struct Failure {
    failed: bool,
    msg: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level);

    match run(&args).await {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!("{:#}", err);
            let failure = Failure {
                failed: true,
                msg: format!("{err:#}"),
            };
            match serde_json::to_string_pretty(&failure) {
                Ok(json) => println!("{json}"),
                Err(_) => println!("{{\"failed\": true}}"),
            }
            if let Some(hint) = error_hint(&err) {
                eprintln!("hint: {hint}");
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &Args) -> Result<String> {
    let config = Config::load();

    match &args.command {
        Command::Apply { file, check, state } => {
            // Parse input before touching credentials so bad files fail fast
            let mut desired = DesiredConfig::load(file)?;
            if let Some(state) = state {
                desired.state = *state;
            }

            let client = connect(args, &config)?;
            let outcome = Reconciler::new(&client)
                .check_mode(*check)
                .delete_poll_interval(config.delete_poll_interval())
                .run(&desired)
                .await?;
            Ok(serde_json::to_string_pretty(&outcome)?)
        }
        Command::Show {
            resource_group,
            vault_name,
        } => {
            let client = connect(args, &config)?;
            let report = match vault_name {
                Some(name) => facts::get_vault_facts(&client, resource_group, name).await?,
                None => facts::list_vault_facts(&client, resource_group).await?,
            };
            Ok(serde_json::to_string_pretty(&report)?)
        }
    }
}

fn connect(args: &Args, config: &Config) -> Result<ArmClient> {
    let profile_name = config.effective_profile(args.profile.as_deref());
    let profile = auth::load_credentials_profile(&profile_name);
    let cloud = config.effective_cloud(args.cloud);

    let subscription_id = config
        .effective_subscription(args.subscription_id.as_deref(), profile.as_ref())
        .ok_or_else(|| {
            anyhow!("No Azure subscription configured. Set AZURE_SUBSCRIPTION_ID or use --subscription-id")
        })?;

    let source = auth::resolve_source(|key| std::env::var(key).ok(), profile.as_ref())?;

    tracing::info!(
        "Using subscription: {}, cloud: {:?}, profile: {}",
        subscription_id,
        cloud,
        profile_name
    );

    let http = ArmHttpClient::new()?;
    let credentials = AzureCredentials::new(source, cloud, http.inner().clone());

    Ok(
        ArmClient::new(credentials, http, &subscription_id, cloud.resource_manager())?
            .with_poll_interval(config.operation_poll_interval()),
    )
}
