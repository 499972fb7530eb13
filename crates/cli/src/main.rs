//! Administrative CLI for the tryjob metadata store.

use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, Parser, Subcommand};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tryjob_core::config::AppConfig;
use tryjob_core::{Classifications, Label, Tryjob, TryjobResult};
use tryjob_metadata::{
    DocTryjobStore, ExpectationRepo, IssueRepo, TryjobRepo, TryjobStore, from_config,
};

#[derive(Parser)]
#[command(name = "tryjobctl")]
#[command(about = "Administrative CLI for the tryjob metadata store")]
#[command(version)]
struct Cli {
    /// Configuration file (optional; TRYJOB_* env vars override it)
    #[arg(long, env = "TRYJOBCTL_CONFIG", default_value = "tryjobctl.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Issue commands
    Issue {
        #[command(subcommand)]
        command: IssueCommands,
    },
    /// Tryjob commands
    Tryjob {
        #[command(subcommand)]
        command: TryjobCommands,
    },
    /// Expectation change log commands
    Expectations {
        #[command(subcommand)]
        command: ExpectationCommands,
    },
    /// Maintenance commands
    Gc {
        #[command(subcommand)]
        command: GcCommands,
    },
    /// Check that the configured store is reachable
    Health,
}

#[derive(Subcommand)]
enum IssueCommands {
    /// List all issues
    List,
    /// Show one issue
    Show {
        issue_id: i64,
        /// Attach tryjobs to their patchsets
        #[arg(long, default_value_t = false)]
        tryjobs: bool,
        /// Only attach tryjobs of these patchsets (repeatable)
        #[arg(long = "patchset")]
        patchsets: Vec<i64>,
    },
    /// Delete an issue with its tryjobs, results and change log
    Delete { issue_id: i64 },
}

#[derive(Subcommand)]
enum TryjobCommands {
    /// Show one tryjob
    Show { issue_id: i64, build_id: i64 },
    /// Show the tryjobs of an issue with their results
    Results {
        issue_id: i64,
        /// Only include these patchsets (repeatable)
        #[arg(long = "patchset")]
        patchsets: Vec<i64>,
    },
}

#[derive(Subcommand)]
enum ExpectationCommands {
    /// Show the current expectations of an issue
    Show { issue_id: i64 },
    /// Show the triage log of an issue, newest first
    Log {
        issue_id: i64,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long, default_value_t = 20)]
        size: usize,
        /// Include the labels of each change
        #[arg(long, default_value_t = false)]
        details: bool,
    },
    /// Record a triage change
    Add {
        issue_id: i64,
        #[command(flatten)]
        user: UserArgs,
        /// TEST:DIGEST:LABEL (repeatable)
        #[arg(long = "label", required = true, value_parser = parse_triage)]
        labels: Vec<Triage>,
    },
    /// Revert a triage change
    Undo {
        issue_id: i64,
        change_id: i64,
        #[command(flatten)]
        user: UserArgs,
    },
}

#[derive(Args)]
struct UserArgs {
    /// User recorded on the change
    #[arg(long, env = "TRYJOBCTL_USER")]
    user: String,
}

#[derive(Subcommand)]
enum GcCommands {
    /// Remove expectation changes that never completed
    IncompleteChanges {
        /// Age in seconds (defaults to the configured grace period)
        #[arg(long)]
        older_than_secs: Option<i64>,
    },
}

#[derive(Clone, Debug)]
struct Triage {
    test: String,
    digest: String,
    label: Label,
}

fn parse_triage(value: &str) -> Result<Triage, String> {
    let mut parts = value.rsplitn(3, ':');
    let (Some(label), Some(digest), Some(test)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(format!("expected TEST:DIGEST:LABEL, got {value:?}"));
    };
    if test.is_empty() || digest.is_empty() {
        return Err(format!("test and digest must not be empty in {value:?}"));
    }
    let label = label.parse::<Label>().map_err(|e| e.to_string())?;
    Ok(Triage {
        test: test.to_string(),
        digest: digest.to_string(),
        label,
    })
}

fn to_classifications(labels: Vec<Triage>) -> Classifications {
    let mut changes = Classifications::new();
    for triage in labels {
        changes
            .entry(triage.test)
            .or_default()
            .insert(triage.digest, triage.label);
    }
    changes
}

#[derive(Serialize)]
struct TryjobWithResults {
    #[serde(flatten)]
    tryjob: Tryjob,
    results: Vec<TryjobResult>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let Cli { config, command } = Cli::parse();

    // Logs go to stderr; stdout carries JSON only.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = load_config(&config)?;
    let store = from_config(&config)
        .await
        .context("failed to open tryjob store")?;

    match command {
        Commands::Issue { command } => handle_issue_command(command, &store).await,
        Commands::Tryjob { command } => handle_tryjob_command(command, &store).await,
        Commands::Expectations { command } => handle_expectation_command(command, &store).await,
        Commands::Gc { command } => handle_gc_command(command, &store).await,
        Commands::Health => {
            store.health_check().await.context("health check failed")?;
            print_json(&serde_json::json!({
                "status": "ok",
                "backend": store.backend_name(),
                "namespace": store.namespace(),
            }))
        }
    }
}

fn load_config(path: &Path) -> Result<AppConfig> {
    let mut figment = Figment::new();

    if path.exists() {
        figment = figment.merge(Toml::file(path));
    }

    figment = figment.merge(Env::prefixed("TRYJOB_").split("__"));

    let config: AppConfig = figment
        .extract()
        .context("failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow!(e))
        .context("invalid configuration")?;
    Ok(config)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn handle_issue_command(command: IssueCommands, store: &Arc<DocTryjobStore>) -> Result<()> {
    match command {
        IssueCommands::List => {
            let (issues, total) = store.list_issues().await?;
            print_json(&serde_json::json!({ "issues": issues, "total": total }))
        }
        IssueCommands::Show {
            issue_id,
            tryjobs,
            patchsets,
        } => {
            let issue = store
                .get_issue(issue_id, tryjobs, &patchsets)
                .await?
                .ok_or_else(|| anyhow!("issue {issue_id} not found"))?;
            print_json(&issue)
        }
        IssueCommands::Delete { issue_id } => {
            store
                .delete_issue(issue_id)
                .await
                .with_context(|| format!("failed to delete issue {issue_id}"))?;
            tracing::info!(issue_id, "issue deleted");
            print_json(&serde_json::json!({ "deleted": issue_id }))
        }
    }
}

async fn handle_tryjob_command(command: TryjobCommands, store: &Arc<DocTryjobStore>) -> Result<()> {
    match command {
        TryjobCommands::Show { issue_id, build_id } => {
            let tryjob = store
                .get_tryjob(issue_id, build_id)
                .await?
                .ok_or_else(|| anyhow!("tryjob {build_id} not found in issue {issue_id}"))?;
            print_json(&tryjob)
        }
        TryjobCommands::Results {
            issue_id,
            patchsets,
        } => {
            let (tryjobs, results) = store.get_tryjob_results(issue_id, &patchsets).await?;
            let joined: Vec<TryjobWithResults> = tryjobs
                .into_iter()
                .zip(results)
                .map(|(tryjob, results)| TryjobWithResults { tryjob, results })
                .collect();
            print_json(&joined)
        }
    }
}

async fn handle_expectation_command(
    command: ExpectationCommands,
    store: &Arc<DocTryjobStore>,
) -> Result<()> {
    match command {
        ExpectationCommands::Show { issue_id } => {
            let expectations = store.get_expectations(issue_id).await?;
            print_json(&expectations)
        }
        ExpectationCommands::Log {
            issue_id,
            offset,
            size,
            details,
        } => {
            let (entries, total) = store.query_log(issue_id, offset, size, details).await?;
            print_json(&serde_json::json!({ "entries": entries, "total": total }))
        }
        ExpectationCommands::Add {
            issue_id,
            user,
            labels,
        } => {
            let changes = to_classifications(labels);
            let change_id = store
                .add_change(issue_id, &changes, &user.user)
                .await
                .context("failed to record triage change")?;
            print_json(&serde_json::json!({ "change_id": change_id }))
        }
        ExpectationCommands::Undo {
            issue_id,
            change_id,
            user,
        } => {
            let restored = store
                .undo_change(issue_id, change_id, &user.user)
                .await
                .with_context(|| format!("failed to undo change {change_id}"))?;
            print_json(&restored)
        }
    }
}

async fn handle_gc_command(command: GcCommands, store: &Arc<DocTryjobStore>) -> Result<()> {
    match command {
        GcCommands::IncompleteChanges { older_than_secs } => {
            let purged = match older_than_secs {
                Some(secs) if secs < 0 => bail!("--older-than-secs must not be negative"),
                Some(secs) => match purge_cutoff(OffsetDateTime::now_utc(), secs) {
                    Some(cutoff) => store.purge_incomplete_changes(cutoff).await?,
                    None => 0,
                },
                None => store.purge_abandoned_changes().await?,
            };
            tracing::info!(purged, "incomplete changes purged");
            print_json(&serde_json::json!({ "purged": purged }))
        }
    }
}

/// `now` minus `secs`, or `None` when that is before the earliest
/// representable time.
fn purge_cutoff(now: OffsetDateTime, secs: i64) -> Option<OffsetDateTime> {
    now.checked_sub(time::Duration::seconds(secs))
}
