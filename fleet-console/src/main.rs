mod client;
mod poller;

use chrono::Utc;
use clap::{Parser, Subcommand};
use client::{ClientError, HubClient};
use fleet_core::AgentRecord;
use poller::FleetView;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

const FETCH_QUEUE_CAPACITY: usize = 8;

#[derive(Parser, Debug)]
#[command(name = "fleet-console")]
struct Args {
    #[arg(long, default_value = "")]
    hub_url: String,
    /// How often the observer view is reconciled against the hub.
    #[arg(long)]
    poll_interval_ms: Option<u64>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Live view: reconcile on a fixed period and accept commands on stdin.
    Watch,
    /// One-shot fleet listing.
    List,
    /// Inject a fault into one agent.
    Fault {
        agent_id: String,
        fault_type: String,
        #[arg(long)]
        duration_seconds: Option<i64>,
    },
    /// Clear all faults on one agent and start graceful recovery.
    Recover { agent_id: String },
}

#[derive(Debug, PartialEq, Eq)]
enum ConsoleCommand {
    Fault {
        agent_id: String,
        fault_type: String,
        duration_seconds: Option<i64>,
    },
    Recover {
        agent_id: String,
    },
    Quit,
}

enum FetchOutcome {
    Snapshot(Vec<AgentRecord>),
    Failed(String),
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging();

    let hub_url = resolve_hub_url(&args.hub_url);
    let client = match HubClient::new(&hub_url) {
        Ok(value) => Arc::new(value),
        Err(err) => {
            eprintln!("failed to build hub client: {err}");
            return;
        }
    };

    let poll_interval_ms =
        resolve_millis(args.poll_interval_ms, "FLEET_POLL_INTERVAL_MS", 2_000).max(100);
    let result = match args.command.unwrap_or(Command::Watch) {
        Command::Watch => {
            watch(client, Duration::from_millis(poll_interval_ms)).await;
            Ok(())
        }
        Command::List => list_once(&client).await,
        Command::Fault {
            agent_id,
            fault_type,
            duration_seconds,
        } => {
            run_command(&client, || async {
                client
                    .inject_fault(&agent_id, &fault_type, duration_seconds)
                    .await
            })
            .await
        }
        Command::Recover { agent_id } => {
            run_command(&client, || async { client.recover(&agent_id).await }).await
        }
    };

    if let Err(err) = result {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

async fn list_once(client: &HubClient) -> Result<(), ClientError> {
    let agents = client.list_agents().await?;
    print_snapshot(&agents);
    Ok(())
}

/// One-shot command path: apply the mutation, then fetch a fresh snapshot so
/// the printed view is guaranteed to include the command's own effect. A
/// failed command leaves nothing printed except the error; there is no
/// optimistic local mutation.
async fn run_command<F, Fut>(client: &HubClient, command: F) -> Result<(), ClientError>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<AgentRecord, ClientError>>,
{
    let record = command().await?;
    println!("{}", format_agent_line(&record));
    list_once(client).await
}

/// The reconciliation loop. Periodic ticks and command-triggered refreshes
/// both feed the same single-slot fetch admission; whichever fetch completes
/// last owns the view.
async fn watch(client: Arc<HubClient>, poll_interval: Duration) {
    let mut view = FleetView::default();
    let mut ticker = tokio::time::interval(poll_interval);
    let (fetch_tx, mut fetch_rx) = mpsc::channel::<FetchOutcome>(FETCH_QUEUE_CAPACITY);
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    info!(event = "watch_start", poll_interval_ms = poll_interval.as_millis() as u64);
    println!("commands: fault <agent_id> <LATENCY|ERROR> [seconds] | recover <agent_id> | quit");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if view.try_begin_fetch() {
                    spawn_fetch(client.clone(), fetch_tx.clone());
                }
            }
            Some(outcome) = fetch_rx.recv() => {
                match outcome {
                    FetchOutcome::Snapshot(agents) => view.complete_success(agents, Utc::now()),
                    FetchOutcome::Failed(error) => view.complete_failure(error),
                }
                print_view(&view);
                if view.take_deferred_refresh() {
                    spawn_fetch(client.clone(), fetch_tx.clone());
                }
            }
            line = stdin.next_line() => {
                let Ok(Some(line)) = line else { break };
                match parse_command(&line) {
                    Some(ConsoleCommand::Quit) => break,
                    Some(command) => {
                        if apply_command(&client, command).await && view.request_refresh() {
                            spawn_fetch(client.clone(), fetch_tx.clone());
                        }
                    }
                    None => {
                        println!("unrecognized command: {line}");
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    info!(event = "watch_stop");
}

fn spawn_fetch(client: Arc<HubClient>, tx: mpsc::Sender<FetchOutcome>) {
    tokio::spawn(async move {
        let outcome = match client.list_agents().await {
            Ok(agents) => FetchOutcome::Snapshot(agents),
            Err(err) => FetchOutcome::Failed(err.to_string()),
        };
        let _ = tx.send(outcome).await;
    });
}

/// Runs one stdin command against the hub. Returns whether an out-of-band
/// refresh should follow; a failed command reports the failure and leaves
/// the displayed state untouched.
async fn apply_command(client: &HubClient, command: ConsoleCommand) -> bool {
    let result = match command {
        ConsoleCommand::Fault {
            agent_id,
            fault_type,
            duration_seconds,
        } => {
            client
                .inject_fault(&agent_id, &fault_type, duration_seconds)
                .await
        }
        ConsoleCommand::Recover { agent_id } => client.recover(&agent_id).await,
        ConsoleCommand::Quit => return false,
    };
    match result {
        Ok(record) => {
            println!("applied: {}", format_agent_line(&record));
            true
        }
        Err(err) => {
            println!("{err}");
            false
        }
    }
}

fn parse_command(line: &str) -> Option<ConsoleCommand> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    match parts.as_slice() {
        ["quit"] | ["q"] | ["exit"] => Some(ConsoleCommand::Quit),
        ["recover", agent_id] => Some(ConsoleCommand::Recover {
            agent_id: agent_id.to_string(),
        }),
        ["fault", agent_id, fault_type] => Some(ConsoleCommand::Fault {
            agent_id: agent_id.to_string(),
            fault_type: fault_type.to_string(),
            duration_seconds: None,
        }),
        ["fault", agent_id, fault_type, seconds] => {
            let duration_seconds = seconds.parse::<i64>().ok()?;
            Some(ConsoleCommand::Fault {
                agent_id: agent_id.to_string(),
                fault_type: fault_type.to_string(),
                duration_seconds: Some(duration_seconds),
            })
        }
        _ => None,
    }
}

fn print_view(view: &FleetView) {
    let synced = view
        .last_synced_at()
        .map(|at| at.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "never".to_string());
    match view.last_error() {
        Some(error) => println!("-- fleet @ {synced} (stale: {error})"),
        None => println!("-- fleet @ {synced}"),
    }
    print_snapshot(view.agents());
}

fn print_snapshot(agents: &[AgentRecord]) {
    if agents.is_empty() {
        println!("(no agents)");
        return;
    }
    for record in agents {
        println!("{}", format_agent_line(record));
    }
}

fn format_agent_line(record: &AgentRecord) -> String {
    let faults = if record.active_faults.is_empty() {
        "-".to_string()
    } else {
        record
            .active_faults
            .iter()
            .map(|fault| fault.as_str())
            .collect::<Vec<_>>()
            .join(",")
    };
    format!(
        "{:<20} {:<10} {:>7.0}ms {:>6.1}% faults={}",
        record.agent_id,
        record.status,
        record.metrics.latency_ms,
        record.metrics.error_rate * 100.0,
        faults
    )
}

fn resolve_hub_url(flag: &str) -> String {
    let url = if !flag.trim().is_empty() {
        flag.to_string()
    } else if let Ok(value) = std::env::var("FLEET_HUB_URL") {
        if value.trim().is_empty() {
            "http://127.0.0.1:8000".to_string()
        } else {
            value
        }
    } else {
        "http://127.0.0.1:8000".to_string()
    };
    url.trim_end_matches('/').to_string()
}

fn resolve_millis(flag: Option<u64>, env_key: &str, default: u64) -> u64 {
    if let Some(value) = flag {
        return value;
    }
    if let Ok(value) = std::env::var(env_key) {
        if let Ok(parsed) = value.trim().parse() {
            return parsed;
        }
    }
    default
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::{AgentConfig, AgentMetrics, AgentStatus, FaultType};

    #[test]
    fn parses_fault_commands_with_and_without_duration() {
        assert_eq!(
            parse_command("fault a1 LATENCY"),
            Some(ConsoleCommand::Fault {
                agent_id: "a1".to_string(),
                fault_type: "LATENCY".to_string(),
                duration_seconds: None,
            })
        );
        assert_eq!(
            parse_command("fault a1 ERROR 30"),
            Some(ConsoleCommand::Fault {
                agent_id: "a1".to_string(),
                fault_type: "ERROR".to_string(),
                duration_seconds: Some(30),
            })
        );
        assert_eq!(parse_command("fault a1 ERROR x"), None);
        assert_eq!(
            parse_command("recover a1"),
            Some(ConsoleCommand::Recover {
                agent_id: "a1".to_string(),
            })
        );
        assert_eq!(parse_command("restart a1"), None);
    }

    #[test]
    fn poll_interval_resolution_prefers_flag_then_env_then_default() {
        assert_eq!(resolve_millis(Some(500), "FLEET_CONSOLE_TEST_UNSET", 2_000), 500);
        assert_eq!(resolve_millis(None, "FLEET_CONSOLE_TEST_UNSET", 2_000), 2_000);

        std::env::set_var("FLEET_CONSOLE_TEST_POLL", "750");
        assert_eq!(resolve_millis(None, "FLEET_CONSOLE_TEST_POLL", 2_000), 750);
        std::env::remove_var("FLEET_CONSOLE_TEST_POLL");
    }

    #[test]
    fn agent_line_includes_faults_and_status() {
        let record = AgentRecord {
            agent_id: "a1".to_string(),
            service_name: "demo".to_string(),
            status: AgentStatus::Degraded,
            last_heartbeat: Utc::now(),
            metrics: AgentMetrics {
                latency_ms: 2_100.0,
                error_rate: 0.05,
                cpu_usage: 0.2,
                memory_usage: 0.3,
            },
            active_faults: vec![FaultType::Latency],
            config: AgentConfig::default(),
        };
        let line = format_agent_line(&record);
        assert!(line.contains("DEGRADED"));
        assert!(line.contains("faults=LATENCY"));
        assert!(line.contains("2100ms"));
    }
}
