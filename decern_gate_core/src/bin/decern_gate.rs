use std::process::ExitCode;

use anyhow::Context;
use decern_gate_core::config::GateConfig;
use decern_gate_core::gate::{Gate, GateResult};
use decern_gate_core::policy::HighImpactPolicy;
use decern_gate_core::repository::Repository;
use decern_gate_core::Error;
use tracing_subscriber::EnvFilter;

const FALLBACK_LOG_FILTER: &str = "warn";

fn main() -> ExitCode {
    match run() {
        Ok(result) => {
            print!("{}", result.report);
            ExitCode::from(result.outcome.exit_code())
        }
        Err(err) => {
            eprintln!("decern-gate: unexpected error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> anyhow::Result<GateResult> {
    let config = match GateConfig::from_env() {
        Ok(config) => config,
        Err(Error::Arguments(err)) if !err.use_stderr() => err.exit(),
        Err(err) => {
            init_logging(FALLBACK_LOG_FILTER);
            return Ok(GateResult::invalid_config(&err));
        }
    };
    init_logging(&config.log_filter);
    tracing::debug!(?config, "configuration loaded");

    let repo = match Repository::open(config.repo_path.as_std_path()) {
        Ok(repo) => repo,
        Err(err) => {
            tracing::warn!(error = %err, path = %config.repo_path, "repository unavailable");
            return Ok(GateResult::repository_unavailable(&err));
        }
    };
    let revisions = repo.resolve_revisions(config.revisions.as_ref());

    let mut text = config.text.clone();
    if text.commit_message.is_none() {
        text.commit_message = repo.head_message().unwrap_or_else(|err| {
            tracing::warn!(error = %err, "could not read HEAD commit message");
            None
        });
    }

    let policy = match HighImpactPolicy::new(&config.extra_patterns) {
        Ok(policy) => policy,
        Err(err) => return Ok(GateResult::invalid_config(&err)),
    };

    let (validator, judge) =
        decern_gate_clients::default_clients().context("failed to initialise the HTTP client")?;

    let gate = Gate::new(&config, &policy, &repo, &validator, &judge);
    Ok(gate.run(&revisions, &text.joined()))
}

fn init_logging(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new(FALLBACK_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}
