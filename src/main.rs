use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use attempt_throttler::config::ThrottlerConfig;
use attempt_throttler::throttle::{AttemptThrottler, Decision, ThrottlePolicy};

/// Replay attempt timelines against throttle policies.
#[derive(Debug, Parser)]
#[command(name = "throttle-sim", version, about)]
struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Feed attempts at the given times (in seconds) through one throttler
    Simulate {
        /// Comma-separated attempt times in seconds, e.g. 0,10,20,100,321
        #[arg(long, value_delimiter = ',', required = true)]
        at: Vec<u64>,

        /// Named policy from the configuration (default policy if omitted)
        #[arg(long)]
        policy: Option<String>,

        /// Configuration file (YAML)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Print one JSON object per attempt
        #[arg(long)]
        json: bool,
    },
    /// Load a configuration file and check every policy in it
    Validate {
        /// Configuration file (YAML)
        #[arg(long)]
        config: PathBuf,
    },
}

/// One simulated attempt.
#[derive(Debug, Serialize)]
struct Step {
    at_secs: u64,
    allowed: bool,
    attempts: u32,
    remaining_attempts: u32,
    blocked: bool,
    retry_after_secs: u64,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    match cli.command {
        Command::Simulate {
            at,
            policy,
            config,
            json,
        } => simulate(&at, policy.as_deref(), config, json),
        Command::Validate { config } => validate(config),
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn simulate(
    times: &[u64],
    policy_name: Option<&str>,
    config_path: Option<PathBuf>,
    json: bool,
) -> anyhow::Result<()> {
    let config = ThrottlerConfig::load(config_path.as_deref())?;
    let policy = match policy_name {
        Some(name) => config.policy(name)?,
        None => config.default_policy.to_policy()?,
    };

    info!(
        policy = policy_name.unwrap_or("default"),
        max_attempts = policy.max_attempts(),
        time_window_secs = policy.time_window().as_secs(),
        cooldown_period_secs = policy.cooldown_period().as_secs(),
        "Simulating attempts"
    );

    for (step, decision) in replay(policy, times) {
        if json {
            println!("{}", serde_json::to_string(&step)?);
        } else {
            println!("{}", describe(&step, decision));
        }
    }

    Ok(())
}

/// Run `times` (in seconds) through a fresh throttler.
fn replay(policy: ThrottlePolicy, times: &[u64]) -> Vec<(Step, Decision)> {
    let mut throttler = AttemptThrottler::new(policy);
    times
        .iter()
        .map(|&at_secs| {
            let decision = throttler.evaluate(Duration::from_secs(at_secs));
            let step = Step {
                at_secs,
                allowed: decision.is_allowed(),
                attempts: throttler.attempts(),
                remaining_attempts: throttler.remaining_attempts(),
                blocked: throttler.is_blocked(),
                retry_after_secs: decision.retry_after().as_secs(),
            };
            (step, decision)
        })
        .collect()
}

fn describe(step: &Step, decision: Decision) -> String {
    match decision {
        Decision::Allowed { remaining } => format!(
            "t={:>6}s  allowed  attempts={} remaining={}",
            step.at_secs, step.attempts, remaining
        ),
        Decision::Denied { retry_after } => format!(
            "t={:>6}s  denied   too many attempts, retry in {}s",
            step.at_secs,
            retry_after.as_secs()
        ),
    }
}

fn validate(path: PathBuf) -> anyhow::Result<()> {
    let config = ThrottlerConfig::load(Some(path.as_path()))?;
    config.validate()?;

    println!("default: {:?}", config.default_policy);
    for name in config.policy_names() {
        println!("{}: {:?}", name, config.policies[name]);
    }

    info!(path = %path.display(), policies = config.policies.len(), "Configuration is valid");
    Ok(())
}
