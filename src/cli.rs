//! Headless interface to a running `gatehoused` daemon.
//!
//! Talks to the gateway HTTP API over `reqwest`, grounded on the upstream
//! app's `GatewayClient`/subcommand dispatch. Unlike that app, there is no
//! keyring or PID file: the bind address and token are read straight from
//! `EngineConfig`, the same config file the daemon itself loads, so the two
//! processes never disagree about where the gateway lives.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use gatehouse::config::load_default_config;
use serde_json::{json, Value};

#[derive(Parser, Debug)]
#[command(
    name = "gatehouse",
    about = "Scheduling and dispatch engine CLI",
    version,
    long_about = "Headless interface to a running gatehoused daemon."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output raw JSON instead of pretty-printed.
    #[arg(long, global = true)]
    raw: bool,

    /// Override the daemon's bind address (defaults to the value in config).
    #[arg(long, global = true)]
    addr: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start, stop, or check on the background daemon process.
    Daemon(DaemonArgs),
    /// Manage scheduled jobs.
    #[command(subcommand)]
    Cron(CronCommand),
    /// Send an immediate system event into a session, bypassing the catalog.
    Event(EventArgs),
}

#[derive(Parser, Debug)]
struct DaemonArgs {
    /// start | stop | status
    #[arg(default_value = "status")]
    action: String,
}

#[derive(Subcommand, Debug)]
enum CronCommand {
    /// List all jobs.
    List,
    /// Create a job.
    Add(AddArgs),
    /// Show a single job.
    Get { job_id: String },
    /// Enable or disable a job.
    Toggle {
        job_id: String,
        #[arg(long)]
        enabled: bool,
    },
    /// Delete a job.
    Remove { job_id: String },
    /// Run a job now, out of band from its normal schedule.
    Run {
        job_id: String,
        /// Ignore `enabled` and due-ness.
        #[arg(long)]
        force: bool,
    },
    /// Show a job's recent run history.
    Runs {
        job_id: String,
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[derive(Parser, Debug)]
struct AddArgs {
    /// Human-readable job name.
    #[arg(long)]
    name: String,
    /// One-shot: fire once at this many milliseconds since the epoch.
    #[arg(long, conflicts_with_all = ["every", "cron"])]
    at_ms: Option<i64>,
    /// Recurring: fire every N milliseconds.
    #[arg(long, conflicts_with_all = ["at_ms", "cron"])]
    every_ms: Option<i64>,
    /// Recurring: 5-field cron expression, e.g. "0 9 * * 1-5".
    #[arg(long, conflicts_with_all = ["at_ms", "every_ms"])]
    cron: Option<String>,
    /// IANA timezone for `--cron` (defaults to host local time).
    #[arg(long)]
    tz: Option<String>,
    /// Run in the isolated session for `agent_id` instead of its main session.
    #[arg(long)]
    isolated: bool,
    #[arg(long)]
    agent_id: Option<String>,
    /// Text injected into the main session (for `--isolated`-less jobs).
    #[arg(long, conflicts_with = "message")]
    text: Option<String>,
    /// Prompt run in an isolated session (implies `--isolated`).
    #[arg(long, conflicts_with = "text")]
    message: Option<String>,
    /// Deliver the isolated run's reply to a channel.
    #[arg(long, requires = "message")]
    channel: Option<String>,
    #[arg(long, requires = "channel")]
    to: Option<String>,
    #[arg(long)]
    once: bool,
    #[arg(long)]
    disabled: bool,
}

#[derive(Parser, Debug)]
struct EventArgs {
    /// Text injected into the main session.
    text: String,
    /// "now" (default) or "next-heartbeat".
    #[arg(long, default_value = "now")]
    mode: String,
    #[arg(long)]
    agent_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Gateway client
// ---------------------------------------------------------------------------

struct GatewayClient {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

impl GatewayClient {
    fn new(base_url: String, token: String) -> Self {
        Self { base_url, token, client: reqwest::Client::new() }
    }

    fn auth_header(&self) -> String {
        format!("Bearer {}", self.token)
    }

    async fn get(&self, path: &str) -> reqwest::Result<Value> {
        self.client
            .get(format!("{}{path}", self.base_url))
            .header("Authorization", self.auth_header())
            .send()
            .await?
            .json::<Value>()
            .await
    }

    async fn post(&self, path: &str, body: Value) -> reqwest::Result<Value> {
        self.client
            .post(format!("{}{path}", self.base_url))
            .header("Authorization", self.auth_header())
            .json(&body)
            .send()
            .await?
            .json::<Value>()
            .await
    }

    async fn patch(&self, path: &str, body: Value) -> reqwest::Result<Value> {
        self.client
            .patch(format!("{}{path}", self.base_url))
            .header("Authorization", self.auth_header())
            .json(&body)
            .send()
            .await?
            .json::<Value>()
            .await
    }

    async fn delete(&self, path: &str) -> reqwest::Result<()> {
        self.client
            .delete(format!("{}{path}", self.base_url))
            .header("Authorization", self.auth_header())
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn health(&self) -> reqwest::Result<Value> {
        self.client.get(format!("{}/api/v1/health", self.base_url)).send().await?.json::<Value>().await
    }
}

fn print_value(value: &Value, raw: bool) {
    if raw {
        println!("{value}");
    } else {
        println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
    }
}

fn print_err(msg: impl std::fmt::Display) {
    eprintln!("\x1b[31merror\x1b[0m: {msg}");
}

fn daemon_pid_path() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("/tmp")).join(".gatehouse").join("daemon.pid")
}

fn resolve_client(addr_override: Option<&str>) -> GatewayClient {
    let config = load_default_config();
    let base = addr_override.map(str::to_string).unwrap_or_else(|| format!("http://{}", config.gateway.bind_addr));
    GatewayClient::new(base, config.gateway.auth_token)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn handle_daemon(args: &DaemonArgs, client: &GatewayClient) {
    match args.action.as_str() {
        "status" => match client.health().await {
            Ok(_) => match client.get("/api/v1/cron/status").await {
                Ok(v) => println!("daemon: running at {} — {v}", client.base_url),
                Err(e) => print_err(format!("daemon reachable but status failed: {e}")),
            },
            Err(_) => println!("daemon: not running at {}", client.base_url),
        },
        "start" => {
            if client.health().await.is_ok() {
                println!("daemon: already running at {}", client.base_url);
                return;
            }
            let exe = std::env::current_exe().unwrap_or_else(|_| PathBuf::from("gatehouse"));
            let daemon_exe = exe.with_file_name(if cfg!(windows) { "gatehoused.exe" } else { "gatehoused" });
            match std::process::Command::new(&daemon_exe)
                .stdin(std::process::Stdio::null())
                .stdout(std::process::Stdio::null())
                .stderr(std::process::Stdio::null())
                .spawn()
            {
                Ok(_) => println!("daemon: starting in background"),
                Err(e) => print_err(format!("failed to start gatehoused: {e}")),
            }
        }
        "stop" => match std::fs::read_to_string(daemon_pid_path()) {
            Ok(content) => match content.trim().parse::<u32>() {
                Ok(pid) => {
                    #[cfg(unix)]
                    {
                        use std::process::Command;
                        let _ = Command::new("kill").arg(pid.to_string()).status();
                        println!("daemon: sent SIGTERM to PID {pid}");
                    }
                    #[cfg(not(unix))]
                    println!("daemon stop: not implemented on this platform (PID {pid})");
                }
                Err(_) => print_err("daemon.pid is corrupt"),
            },
            Err(_) => println!("daemon: not running"),
        },
        other => print_err(format!("unknown daemon action '{other}'. Use start | stop | status")),
    }
}

async fn handle_cron(cmd: &CronCommand, client: &GatewayClient, raw: bool) {
    match cmd {
        CronCommand::List => match client.get("/api/v1/cron/jobs").await {
            Ok(v) => print_value(&v, raw),
            Err(e) => print_err(format!("cron list: {e}")),
        },
        CronCommand::Add(args) => match build_create_request(args) {
            Ok(body) => match client.post("/api/v1/cron/jobs", body).await {
                Ok(v) => print_value(&v, raw),
                Err(e) => print_err(format!("cron add: {e}")),
            },
            Err(msg) => print_err(msg),
        },
        CronCommand::Get { job_id } => match client.get(&format!("/api/v1/cron/jobs/{job_id}")).await {
            Ok(v) => print_value(&v, raw),
            Err(e) => print_err(format!("cron get: {e}")),
        },
        CronCommand::Toggle { job_id, enabled } => {
            match client.patch(&format!("/api/v1/cron/jobs/{job_id}"), json!({ "enabled": enabled })).await {
                Ok(v) => print_value(&v, raw),
                Err(e) => print_err(format!("cron toggle: {e}")),
            }
        }
        CronCommand::Remove { job_id } => match client.delete(&format!("/api/v1/cron/jobs/{job_id}")).await {
            Ok(()) => println!("deleted job {job_id}"),
            Err(e) => print_err(format!("cron remove: {e}")),
        },
        CronCommand::Run { job_id, force } => {
            let mode = if *force { "force" } else { "due" };
            match client.post(&format!("/api/v1/cron/jobs/{job_id}/run"), json!({ "mode": mode })).await {
                Ok(v) => print_value(&v, raw),
                Err(e) => print_err(format!("cron run: {e}")),
            }
        }
        CronCommand::Runs { job_id, limit } => {
            let path = match limit {
                Some(n) => format!("/api/v1/cron/jobs/{job_id}/runs?limit={n}"),
                None => format!("/api/v1/cron/jobs/{job_id}/runs"),
            };
            match client.get(&path).await {
                Ok(v) => print_value(&v, raw),
                Err(e) => print_err(format!("cron runs: {e}")),
            }
        }
    }
}

fn build_create_request(args: &AddArgs) -> Result<Value, String> {
    let schedule = match (args.at_ms, args.every_ms, &args.cron) {
        (Some(at_ms), None, None) => json!({ "kind": "at", "at_ms": at_ms }),
        (None, Some(every_ms), None) => json!({ "kind": "every", "every_ms": every_ms }),
        (None, None, Some(expr)) => json!({ "kind": "cron", "expr": expr, "tz": args.tz }),
        _ => return Err("exactly one of --at-ms, --every-ms, --cron is required".to_string()),
    };

    let isolated = args.isolated || args.message.is_some();
    let (session_target, payload) = if isolated {
        let message = args.message.clone().ok_or("--message is required for an isolated job")?;
        (
            "isolated",
            json!({
                "kind": "agentTurn",
                "message": message,
                "channel": args.channel,
                "to": args.to,
                "deliver": args.channel.is_some(),
            }),
        )
    } else {
        let text = args.text.clone().ok_or("--text is required for a main-session job")?;
        ("main", json!({ "kind": "systemEvent", "text": text }))
    };

    Ok(json!({
        "name": args.name,
        "agent_id": args.agent_id,
        "schedule": schedule,
        "session_target": session_target,
        "payload": payload,
        "enabled": !args.disabled,
        "delete_after_run": args.once,
    }))
}

async fn handle_event(args: &EventArgs, client: &GatewayClient) {
    let body = json!({ "mode": args.mode, "text": args.text, "agent_id": args.agent_id });
    match client.post("/api/v1/events", body).await {
        Ok(v) => println!("{}", serde_json::to_string_pretty(&v).unwrap_or_default()),
        Err(e) => print_err(format!("event: {e}")),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let client = resolve_client(cli.addr.as_deref());

    match &cli.command {
        Commands::Daemon(args) => handle_daemon(args, &client).await,
        Commands::Cron(cmd) => handle_cron(cmd, &client, cli.raw).await,
        Commands::Event(args) => handle_event(args, &client).await,
    }
}
