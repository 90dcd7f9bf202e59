//! reqtrace - command-line front end.
//!
//! Every command opens the workspace, does one thing and exits.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use reqtrace::artifact::{Artifact, ArtifactDraft, ArtifactId, ArtifactKind, ArtifactPatch};
use reqtrace::pending::ChangeKey;
use reqtrace::storage::{CommitId, CommitInfo};
use reqtrace::workspace::{Workspace, WorkspaceConfig};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "reqtrace")]
#[command(version, about = "Version-controlled requirements and traceability", long_about = None)]
struct Cli {
    /// Workspace directory
    #[arg(short = 'C', long, global = true, default_value = ".")]
    root: PathBuf,

    /// Commit author name for this commit (defaults to reqtrace.toml)
    #[arg(long, global = true)]
    author: Option<String>,

    /// More log output (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the repository and the folder layout
    Init,

    /// Show uncommitted changes and their draft messages
    Status,

    /// Create an artifact (not committed)
    Create {
        /// Kind: requirement, usecase, testcase, information, risk, project, user
        kind: String,
        title: String,
        #[arg(short, long)]
        description: Option<String>,
        /// Parent artifact id (repeatable)
        #[arg(long)]
        parent: Vec<String>,
        /// Linked artifact id (repeatable)
        #[arg(long)]
        link: Vec<String>,
        /// Custom field as key=value; the value is parsed as JSON when possible
        #[arg(short, long)]
        field: Vec<String>,
    },

    /// Change an artifact (not committed)
    Update {
        id: String,
        #[arg(short, long)]
        title: Option<String>,
        #[arg(short, long)]
        description: Option<String>,
        #[arg(short, long)]
        field: Vec<String>,
        /// Remove a custom field (repeatable)
        #[arg(long)]
        remove_field: Vec<String>,
    },

    /// Mark an artifact deleted
    Delete { id: String },

    /// Undo a soft delete
    Restore { id: String },

    /// Remove an artifact file and every reference to it
    Purge { id: String },

    /// Commit one pending change
    Commit {
        /// Artifact id, or a status path such as counters/requirements.json
        target: String,
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Show history, of one artifact or the whole workspace
    Log {
        id: Option<String>,
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Print an artifact, optionally as of a commit
    Show {
        id: String,
        #[arg(long)]
        at: Option<String>,
    },

    /// Manage baselines
    #[command(subcommand)]
    Baseline(BaselineCommand),

    /// List tags
    Tags,
}

#[derive(Subcommand)]
enum BaselineCommand {
    Create {
        name: String,
        version: String,
        #[arg(short, long, default_value = "")]
        description: String,
    },
    List,
    Delete { id: String },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> CliResult<()> {
    let config = WorkspaceConfig::load(&cli.root).await?;
    let create = matches!(cli.command, Commands::Init) || config.create_if_missing;
    let ws = Workspace::open(config.create_if_missing(create)).await?;

    match cli.command {
        Commands::Init => {
            println!("Initialized workspace in {}", cli.root.display());
        }
        Commands::Status => {
            let changes = ws.refresh_pending().await?;
            if changes.is_empty() {
                println!("nothing to commit");
            }
            for change in changes {
                println!(
                    "{:<9} {:<12} {:<30} {}",
                    change.status.as_str(),
                    change.key.id,
                    change.title,
                    change.draft_message
                );
            }
        }
        Commands::Create {
            kind,
            title,
            description,
            parent,
            link,
            field,
        } => {
            let kind = ArtifactKind::parse(&kind).ok_or_else(|| format!("unknown artifact kind: {}", kind))?;
            let mut draft = ArtifactDraft::titled(title);
            if let Some(description) = description {
                draft = draft.description(description);
            }
            for id in parent {
                draft = draft.parent(ArtifactId::parse(&id)?);
            }
            for id in link {
                draft = draft.link(ArtifactId::parse(&id)?);
            }
            for pair in field {
                let (key, value) = parse_field(&pair)?;
                draft = draft.field(key, value);
            }
            let artifact = ws.create(kind, draft).await?;
            println!("created {}", artifact.id);
        }
        Commands::Update {
            id,
            title,
            description,
            field,
            remove_field,
        } => {
            let mut patch = ArtifactPatch::default();
            if let Some(title) = title {
                patch = patch.title(title);
            }
            if let Some(description) = description {
                patch = patch.description(description);
            }
            for pair in field {
                let (key, value) = parse_field(&pair)?;
                patch = patch.set_field(key, value);
            }
            for key in remove_field {
                patch = patch.remove_field(key);
            }
            let artifact = ws.update(&ArtifactId::parse(&id)?, patch).await?;
            println!("updated {} to revision {}", artifact.id, artifact.revision);
        }
        Commands::Delete { id } => {
            let artifact = ws.soft_delete(&ArtifactId::parse(&id)?).await?;
            println!("deleted {}", artifact.id);
        }
        Commands::Restore { id } => {
            let artifact = ws.restore(&ArtifactId::parse(&id)?).await?;
            println!("restored {}", artifact.id);
        }
        Commands::Purge { id } => {
            let id = ArtifactId::parse(&id)?;
            let affected = ws.permanent_delete(&id).await?;
            println!("purged {}", id);
            for artifact in affected {
                println!("  dropped reference from {}", artifact.id);
            }
        }
        Commands::Commit { target, message } => {
            let key = match ArtifactId::parse(&target) {
                Ok(id) => ChangeKey::artifact(id),
                Err(_) => ws.change_for_path(&target)?,
            };
            let commit = ws
                .commit_and_wait(&key, message.as_deref(), cli.author.as_deref())
                .await?;
            println!("[{}] {}", commit.short(), key.id);
        }
        Commands::Log { id, limit } => {
            let commits = match id {
                Some(id) => {
                    let mut commits = ws.history(&ArtifactId::parse(&id)?).await?;
                    if let Some(limit) = limit {
                        commits.truncate(limit);
                    }
                    commits
                }
                None => ws.log(limit).await?,
            };
            for commit in &commits {
                print_commit(commit);
            }
        }
        Commands::Show { id, at } => {
            let id = ArtifactId::parse(&id)?;
            let artifact = match at {
                Some(hex) => ws.load_at(&id, CommitId::from_hex(&hex)?).await?,
                None => ws.get(&id).await?,
            };
            print_artifact(&artifact);
        }
        Commands::Baseline(BaselineCommand::Create {
            name,
            version,
            description,
        }) => {
            let baseline = ws.create_baseline(&name, &description, &version).await?;
            println!(
                "created baseline {} ({}) with {} artifacts",
                baseline.id,
                baseline.tag,
                baseline.artifact_commits.len()
            );
        }
        Commands::Baseline(BaselineCommand::List) => {
            for baseline in ws.list_baselines().await? {
                println!(
                    "{}  {}  {:<12} {}",
                    baseline.id,
                    baseline.timestamp.format("%Y-%m-%d %H:%M"),
                    baseline.version,
                    baseline.name
                );
            }
        }
        Commands::Baseline(BaselineCommand::Delete { id }) => {
            ws.delete_baseline(&id).await?;
            println!("deleted baseline {}", id);
        }
        Commands::Tags => {
            for tag in ws.tags().await? {
                println!("{:<24} {}  {}", tag.name, &tag.target[..tag.target.len().min(7)], tag.message.trim_end());
            }
        }
    }
    Ok(())
}

/// `key=value`; the value is JSON if it parses, a string otherwise
fn parse_field(pair: &str) -> CliResult<(String, Value)> {
    let (key, raw) = pair
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got {}", pair))?;
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.trim().to_string(), value))
}

fn print_commit(commit: &CommitInfo) {
    println!(
        "{} {} {:<20} {}",
        commit.id.short(),
        commit.timestamp.format("%Y-%m-%d %H:%M"),
        commit.author_name,
        commit.summary()
    );
}

fn print_artifact(artifact: &Artifact) {
    println!("{}  {}", artifact.id, artifact.title);
    println!("revision:      {}", artifact.revision);
    println!("created:       {}", artifact.created_at.to_rfc3339());
    println!("last modified: {}", artifact.last_modified.to_rfc3339());
    if let Some(at) = artifact.lifecycle.deleted_at() {
        println!("deleted:       {}", at.to_rfc3339());
    }
    if !artifact.parent_ids.is_empty() {
        println!("parents:       {}", join_ids(&artifact.parent_ids));
    }
    if !artifact.linked_ids.is_empty() {
        println!("links:         {}", join_ids(&artifact.linked_ids));
    }
    for (key, value) in &artifact.fields {
        println!("{:<14} {}", format!("{}:", key), format_value(value));
    }
    if !artifact.description.is_empty() {
        println!();
        println!("{}", artifact.description.trim_end());
    }
}

fn join_ids(ids: &[ArtifactId]) -> String {
    ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(", ")
}

fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::String(s) => s.clone(),
        _ => value.to_string(),
    }
}
