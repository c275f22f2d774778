use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use vector::consts::{DB_ENV_VAR, EXIT_INTERRUPTED};
use vector::http::HttpConfig;
use vector::provider::ProviderRegistry;
use vector::runner::{RunnerConfig, TaskRunner};
use vector::store::sqlite::SqliteStore;
use vector::store::{ConfigStore, ProviderData, Status};

#[derive(Parser)]
#[command(
    name = "vector",
    version,
    about = "Provider task runner",
    args_conflicts_with_subcommands = true
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Provider type to run (see `vector providers`)
    provider: Option<String>,

    /// Only run the configuration with this name
    #[arg(short, long)]
    username: Option<String>,

    /// Configuration store (SQLite database path)
    #[arg(long, env = DB_ENV_VAR, global = true)]
    db: Option<String>,

    /// HTTP request timeout in seconds
    #[arg(short, long, default_value_t = 30)]
    timeout: u64,

    /// Per-configuration handler deadline in seconds (0 disables)
    #[arg(long, default_value_t = 300)]
    handler_timeout: u64,

    /// Verify TLS certificates (off by default)
    #[arg(long, default_value_t = false)]
    verify_tls: bool,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Add a new provider configuration (fails if it exists)
    Add(RecordArgs),
    /// Add or update a provider configuration
    Save(RecordArgs),
    /// List stored configurations, enabled or not
    List {
        /// Only this provider type
        provider_type: Option<String>,
    },
    /// List provider types this binary can run
    Providers,
}

#[derive(clap::Args)]
struct RecordArgs {
    /// Provider type, e.g. jkforum
    provider_type: String,
    /// Configuration name, e.g. main-account
    name: String,
    /// Configuration data as a JSON object
    #[arg(long)]
    data: String,
    /// Store the configuration disabled
    #[arg(long, default_value_t = false)]
    disabled: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = tokio::select! {
        result = dispatch(cli) => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };
    exit_code(result)
}

/// Process status for a finished dispatch; `None` means Ctrl+C won the race.
fn exit_code(result: Option<Result<()>>) -> ExitCode {
    match result {
        Some(Ok(())) => ExitCode::SUCCESS,
        Some(Err(e)) => {
            error!("failed: {e:#}");
            ExitCode::FAILURE
        }
        None => {
            warn!("interrupted by user");
            ExitCode::from(EXIT_INTERRUPTED)
        }
    }
}

fn handler_deadline(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "vector=debug,info"
    } else {
        "vector=info,warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn dispatch(cli: Cli) -> Result<()> {
    let registry = ProviderRegistry::builtin();

    match cli.command {
        Some(Command::Providers) => {
            for name in registry.names() {
                println!("{name}");
            }
            return Ok(());
        }
        Some(Command::Add(args)) => return write_record(cli.db, args, false).await,
        Some(Command::Save(args)) => return write_record(cli.db, args, true).await,
        Some(Command::List { provider_type }) => {
            return list_records(cli.db, provider_type.as_deref()).await;
        }
        None => {}
    }

    let Some(provider) = cli.provider else {
        bail!("no provider given (try `vector providers`)");
    };

    let store = SqliteStore::new(cli.db.unwrap_or_default())?;
    let config = RunnerConfig {
        http: HttpConfig {
            timeout: Duration::from_secs(cli.timeout),
            verify_tls: cli.verify_tls,
            ..HttpConfig::default()
        },
        handler_timeout: handler_deadline(cli.handler_timeout),
    };
    let runner = TaskRunner::new(Arc::new(store), registry, config);

    info!("starting: {provider}");
    let summary = runner.run(&provider, cli.username.as_deref()).await?;
    info!(
        "✓ {provider} completed ({} succeeded, {} failed)",
        summary.succeeded(),
        summary.failed()
    );
    Ok(())
}

async fn write_record(db: Option<String>, args: RecordArgs, upsert: bool) -> Result<()> {
    let data: ProviderData =
        serde_json::from_str(&args.data).context("--data must be a JSON object")?;
    let status = if args.disabled {
        Status::Disabled
    } else {
        Status::Enabled
    };

    let store = SqliteStore::new(db.unwrap_or_default())?;
    store.connect().await?;
    let written = if upsert {
        store.save(&args.provider_type, &args.name, &data, status).await
    } else {
        store.add(&args.provider_type, &args.name, &data, status).await
    };
    store.close().await?;
    written?;

    println!(
        "✓ Provider '{}' ({}) {}",
        args.name,
        args.provider_type,
        if upsert { "saved" } else { "added" }
    );
    Ok(())
}

async fn list_records(db: Option<String>, provider_type: Option<&str>) -> Result<()> {
    let store = SqliteStore::new(db.unwrap_or_default())?;
    store.connect().await?;
    let records = store.list(provider_type).await;
    store.close().await?;

    for record in records? {
        let status = match record.status {
            Status::Enabled => "enabled",
            Status::Disabled => "disabled",
        };
        println!(
            "{}\t{}\t{}\t{}",
            record.provider_type,
            record.name,
            status,
            record.updated_at.to_rfc3339()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use vector::store::StoreError;

    fn record_args(name: &str, data: &str, disabled: bool) -> RecordArgs {
        RecordArgs {
            provider_type: "jkforum".to_string(),
            name: name.to_string(),
            data: data.to_string(),
            disabled,
        }
    }

    fn temp_db() -> (tempfile::TempDir, String) {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("vector.db").to_string_lossy().into_owned();
        (dir, db)
    }

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_provider_run() {
        let cli = Cli::try_parse_from(["vector", "jkforum", "-u", "main", "-t", "5"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.provider.as_deref(), Some("jkforum"));
        assert_eq!(cli.username.as_deref(), Some("main"));
        assert_eq!(cli.timeout, 5);
        assert_eq!(cli.handler_timeout, 300);
        assert!(!cli.verify_tls);
    }

    #[test]
    fn parses_add_and_save() {
        let cli = Cli::try_parse_from([
            "vector", "add", "jkforum", "main", "--data", "{}", "--db", "x.db",
        ])
        .unwrap();
        let Some(Command::Add(args)) = cli.command else {
            panic!("expected add");
        };
        assert_eq!(args.provider_type, "jkforum");
        assert_eq!(args.name, "main");
        assert!(!args.disabled);
        assert_eq!(cli.db.as_deref(), Some("x.db"));

        let cli = Cli::try_parse_from([
            "vector", "save", "afraid", "bob", "--data", "{}", "--disabled",
        ])
        .unwrap();
        assert!(matches!(cli.command, Some(Command::Save(ref a)) if a.disabled));
    }

    #[test]
    fn add_requires_data() {
        assert!(Cli::try_parse_from(["vector", "add", "jkforum", "main"]).is_err());
    }

    #[test]
    fn zero_handler_timeout_disables_deadline() {
        let cli = Cli::try_parse_from(["vector", "--handler-timeout", "0", "jkforum"]).unwrap();
        assert_eq!(handler_deadline(cli.handler_timeout), None);
        assert_eq!(handler_deadline(7), Some(Duration::from_secs(7)));
    }

    #[test]
    fn exit_codes() {
        assert_eq!(exit_code(Some(Ok(()))), ExitCode::SUCCESS);
        assert_eq!(exit_code(Some(Err(anyhow::anyhow!("boom")))), ExitCode::FAILURE);
        assert_eq!(exit_code(None), ExitCode::from(130));
    }

    #[tokio::test]
    async fn run_without_provider_fails() {
        let cli = Cli::try_parse_from(["vector"]).unwrap();
        let err = dispatch(cli).await.unwrap_err();
        assert!(err.to_string().contains("no provider given"));
    }

    #[tokio::test]
    async fn providers_command_succeeds() {
        let cli = Cli::try_parse_from(["vector", "providers"]).unwrap();
        dispatch(cli).await.unwrap();
    }

    #[tokio::test]
    async fn add_rejects_duplicates_and_save_upserts() {
        let (_dir, db) = temp_db();

        write_record(Some(db.clone()), record_args("main", r#"{"cookie":"a"}"#, false), false)
            .await
            .unwrap();
        let err = write_record(Some(db.clone()), record_args("main", "{}", false), false)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::Duplicate { .. })
        ));

        write_record(Some(db.clone()), record_args("main", r#"{"cookie":"b"}"#, true), true)
            .await
            .unwrap();

        let store = SqliteStore::new(db.as_str()).unwrap();
        store.connect().await.unwrap();
        let record = store.record("jkforum", "main").await.unwrap().unwrap();
        store.close().await.unwrap();
        assert_eq!(record.data["cookie"], "b");
        assert_eq!(record.status, Status::Disabled);
    }

    #[tokio::test]
    async fn add_rejects_non_object_data() {
        let (_dir, db) = temp_db();
        let err = write_record(Some(db), record_args("main", "[1, 2]", false), false)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("--data must be a JSON object"));
    }

    #[tokio::test]
    async fn store_commands_need_a_database() {
        let err = write_record(None, record_args("main", "{}", false), true)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::MissingUrl)
        ));
        assert!(list_records(None, None).await.is_err());
    }

    #[tokio::test]
    async fn list_reads_existing_store() {
        let (_dir, db) = temp_db();
        write_record(Some(db.clone()), record_args("main", "{}", false), false)
            .await
            .unwrap();
        list_records(Some(db.clone()), None).await.unwrap();
        list_records(Some(db), Some("afraid")).await.unwrap();
    }
}
