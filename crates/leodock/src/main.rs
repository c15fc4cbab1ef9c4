//! LeoDock command-line front end
//!
//! ```bash
//! # Supervise an agent from a JSONL stream of interactions; a line
//! # {"resolve": "<notes>"} closes its active escalation
//! agent-runner | leodock watch --agent claude-1
//!
//! # Check which trigger a set of counters would fire
//! leodock evaluate counters.json
//!
//! # Show the effective configuration, secrets redacted
//! leodock --config leodock.toml config
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use coordination::{
    AgentType, EscalationLevel, LevelSelector, SelectionInput, Supervisor, SupervisorConfig,
    TriggerCounters,
};
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tracing::{info, warn};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML configuration file (environment variables still override it)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read interactions as JSON lines and print one report per line
    Watch {
        /// Agent identifier used for escalation bookkeeping
        #[arg(long, default_value = "agent")]
        agent: String,

        /// claude_code, copilot, cline or custom
        #[arg(long, default_value = "claude_code")]
        agent_type: AgentType,

        /// Read from this file instead of stdin
        #[arg(long)]
        input: Option<PathBuf>,

        /// Project goals handed to the analyzer (repeatable)
        #[arg(long = "goal")]
        goals: Vec<String>,
    },

    /// Evaluate trigger counters from a JSON file
    Evaluate {
        counters: PathBuf,

        /// Treat the agent as having escalated within the recent window
        #[arg(long, default_value_t = false)]
        recent: bool,
    },

    /// Print the effective configuration as TOML
    Config,
}

/// One line of `watch` input: an interaction, or `{"resolve": "<notes>"}`
/// closing the agent's active escalation
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WatchLine {
    Resolve { resolve: String },
    Interaction(InteractionLine),
}

#[derive(Debug, Deserialize)]
struct InteractionLine {
    command: String,
    #[serde(default)]
    output: String,
    #[serde(default)]
    files_modified: Vec<String>,
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    context: Map<String, Value>,
}

fn default_success() -> bool {
    true
}

fn load_config(path: Option<&Path>) -> Result<SupervisorConfig> {
    match path {
        Some(path) => SupervisorConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => SupervisorConfig::from_env().context("Invalid environment configuration"),
    }
}

fn parse_line(line: &str) -> Option<WatchLine> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str(trimmed) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            warn!(error = %e, "Skipping malformed interaction line");
            None
        }
    }
}

async fn watch<R: AsyncRead + Unpin>(
    supervisor: &Supervisor,
    agent: String,
    agent_type: AgentType,
    goals: Vec<String>,
    reader: R,
) -> Result<()> {
    let monitor = supervisor.monitor(agent, agent_type);
    if !goals.is_empty() {
        monitor.set_project_goals(goals).await;
    }

    let mut lines = BufReader::new(reader).lines();
    let mut stdout = tokio::io::stdout();
    let mut processed = 0usize;

    while let Some(line) = lines.next_line().await.context("Failed to read input")? {
        let mut encoded = match parse_line(&line) {
            None => continue,
            Some(WatchLine::Resolve { resolve }) => {
                let resolved = monitor.coordinator().resolve(monitor.agent_id(), &resolve).await;
                serde_json::to_string(&serde_json::json!({
                    "agent_id": monitor.agent_id(),
                    "resolved": resolved,
                    "notes": resolve,
                }))?
            }
            Some(WatchLine::Interaction(item)) => {
                let report = monitor
                    .register_interaction(
                        &item.command,
                        &item.output,
                        item.files_modified,
                        item.success,
                        item.context,
                    )
                    .await;
                processed += 1;
                serde_json::to_string(&report)?
            }
        };
        encoded.push('\n');
        stdout.write_all(encoded.as_bytes()).await?;
        stdout.flush().await?;
    }

    let stats = supervisor.coordinator().stats().await;
    info!(
        agent = monitor.agent_id(),
        processed,
        escalations = stats.total_escalations,
        active = stats.active_escalations,
        "Input exhausted"
    );
    Ok(())
}

fn evaluate(config: &SupervisorConfig, path: &Path, recent: bool) -> Result<Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let counters: TriggerCounters = serde_json::from_str(&text)
        .with_context(|| format!("{} is not a valid counters document", path.display()))?;

    let evaluator = coordination::TriggerEvaluator::new(config.thresholds.clone());
    let reason = evaluator.evaluate(&counters);
    let level: Option<EscalationLevel> = reason.map(|reason| {
        LevelSelector.select(
            reason,
            &SelectionInput {
                local_intervention_attempts: 0,
                has_recent_escalation: recent,
            },
        )
    });

    Ok(serde_json::json!({
        "reason": reason,
        "level": level,
        "critical_keyword": evaluator.critical_keyword(&counters.error_messages),
    }))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "leodock=info,coordination=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Watch {
            agent,
            agent_type,
            input,
            goals,
        } => {
            let supervisor =
                Supervisor::from_config(&config).context("Failed to build supervisor")?;
            info!(agent = %agent, ?agent_type, "LeoDock watching agent");
            match input {
                Some(path) => {
                    let file = tokio::fs::File::open(&path)
                        .await
                        .with_context(|| format!("Failed to open {}", path.display()))?;
                    watch(&supervisor, agent, agent_type, goals, file).await?;
                }
                None => watch(&supervisor, agent, agent_type, goals, tokio::io::stdin()).await?,
            }
        }
        Command::Evaluate { counters, recent } => {
            let verdict = evaluate(&config, &counters, recent)?;
            println!("{}", serde_json::to_string_pretty(&verdict)?);
        }
        Command::Config => {
            let rendered = toml::to_string_pretty(&config.redacted())
                .context("Failed to render configuration")?;
            print!("{rendered}");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line_defaults() {
        let Some(WatchLine::Interaction(line)) = parse_line(r#"{"command": "cargo build"}"#) else {
            panic!("expected an interaction line");
        };
        assert_eq!(line.command, "cargo build");
        assert!(line.success);
        assert!(line.output.is_empty());
        assert!(line.files_modified.is_empty());
    }

    #[test]
    fn test_parse_line_skips_blank_and_malformed() {
        assert!(parse_line("   ").is_none());
        assert!(parse_line("{not json").is_none());
        assert!(parse_line(r#"{"output": "missing command"}"#).is_none());
    }

    #[test]
    fn test_parse_resolve_line() {
        match parse_line(r#"{"resolve": "fixed the import"}"#) {
            Some(WatchLine::Resolve { resolve }) => assert_eq!(resolve, "fixed the import"),
            other => panic!("expected a resolve line, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_watch_resolve_line_closes_escalation() {
        let config = SupervisorConfig {
            activity_log_path: None,
            ..Default::default()
        };
        let supervisor = Supervisor::from_config(&config).unwrap();
        let input = [
            r#"{"command": "cargo build", "output": "error: linker failed", "success": false}"#,
            r#"{"command": "cargo build -v", "output": "error: linker failed", "success": false}"#,
            r#"{"command": "cargo check", "output": "error: linker failed", "success": false}"#,
            r#"{"resolve": "installed the linker"}"#,
        ]
        .join("\n");

        watch(
            &supervisor,
            "claude-1".to_string(),
            AgentType::ClaudeCode,
            vec![],
            input.as_bytes(),
        )
        .await
        .unwrap();

        let stats = supervisor.coordinator().stats().await;
        assert_eq!(stats.total_escalations, 1);
        assert_eq!(stats.resolved_escalations, 1);
        assert_eq!(stats.active_escalations, 0);
    }

    #[test]
    fn test_cli_parses_watch_flags() {
        let cli = Cli::parse_from([
            "leodock", "watch", "--agent", "claude-1", "--agent-type", "cline", "--goal", "ship",
        ]);
        match cli.command {
            Command::Watch {
                agent,
                agent_type,
                goals,
                input,
            } => {
                assert_eq!(agent, "claude-1");
                assert_eq!(agent_type, AgentType::Cline);
                assert_eq!(goals, vec!["ship".to_string()]);
                assert!(input.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_evaluate_reports_reason_and_level() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counters.json");
        std::fs::write(&path, r#"{"consecutive_failures": 5}"#).unwrap();

        let verdict = evaluate(&SupervisorConfig::default(), &path, false).unwrap();
        assert_eq!(verdict["reason"], "repeated_failures");
        assert_eq!(verdict["level"], "local_intervention");
    }

    #[test]
    fn test_evaluate_quiet_counters() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counters.json");
        std::fs::write(&path, "{}").unwrap();

        let verdict = evaluate(&SupervisorConfig::default(), &path, false).unwrap();
        assert!(verdict["reason"].is_null());
        assert!(verdict["level"].is_null());
    }
}
