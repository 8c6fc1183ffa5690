//! Portfolio Advisor entry point.
//!
//! Loads configuration, initialises structured logging, wires the ledger
//! and market data adapters, and runs one advisory cycle per account.
//! Exits non-zero if any stage of any account failed.

use anyhow::{bail, Context, Result};
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

use portfolio_advisor::config;
use portfolio_advisor::data::coingecko::CoinGeckoPriceSource;
use portfolio_advisor::data::pools::HttpPoolSource;
use portfolio_advisor::engine::{CycleReport, EngineConfig, Orchestrator};
use portfolio_advisor::ledger::dry_run::DryRunLedger;
use portfolio_advisor::ledger::near::NearRpcLedger;
use portfolio_advisor::ledger::{Ledger, LedgerClient};
use portfolio_advisor::storage;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = config::AppConfig::load("config.toml")?;

    init_logging();

    // Accounts from the command line, else from config
    let args: Vec<String> = std::env::args().skip(1).collect();
    let accounts = if args.is_empty() {
        cfg.agent.accounts.clone()
    } else {
        args
    };
    if accounts.is_empty() {
        bail!("No accounts given: pass account ids as arguments or set [agent].accounts");
    }

    info!(
        agent_name = %cfg.agent.name,
        contract = %cfg.ledger.contract_id,
        accounts = accounts.len(),
        dry_run = cfg.agent.dry_run,
        "Portfolio advisor starting up"
    );

    // -- Initialise components -------------------------------------------

    let signing_key = match cfg.signing_key() {
        Ok(key) => key,
        Err(e) if cfg.agent.dry_run => {
            warn!(error = %e, "No signing key configured; dry run needs none");
            SecretString::new(String::new())
        }
        Err(e) => return Err(e),
    };

    let near: Arc<dyn Ledger> = Arc::new(
        NearRpcLedger::new(&cfg.ledger, signing_key).context("Failed to build ledger client")?,
    );
    let ledger: Arc<dyn Ledger> = if cfg.agent.dry_run {
        info!("Dry run: ledger writes will be logged, not submitted");
        Arc::new(DryRunLedger::new(near))
    } else {
        near
    };
    let ledger = LedgerClient::new(ledger, Duration::from_secs(cfg.ledger.call_timeout_secs));

    let prices = Arc::new(CoinGeckoPriceSource::new(&cfg.data_sources.coingecko)?);
    let pools = Arc::new(HttpPoolSource::new(&cfg.data_sources.pools_url)?);

    // Ctrl+C stops the remaining stages at the next stage boundary
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received.");
            let _ = shutdown_tx.send(true);
        }
    });

    let orchestrator = Orchestrator::new(ledger, prices, pools, EngineConfig::from(&cfg))
        .with_shutdown(shutdown_rx);

    // -- Run -------------------------------------------------------------

    let reports = run_ai_agents(&orchestrator, &accounts).await;

    for report in &reports {
        if let Err(e) = storage::append_journal(report, cfg.agent.journal_path.as_deref()) {
            error!(account = %report.account_id, error = %e, "Failed to write journal entry");
        }
    }

    let failed = reports.iter().filter(|r| r.has_failures()).count();
    info!(accounts = reports.len(), failed, "Portfolio advisor finished");

    if failed > 0 {
        bail!("{failed} of {} account cycles reported failures", reports.len());
    }
    Ok(())
}

/// Run one full cycle per account and print each account's stage results.
async fn run_ai_agents(orchestrator: &Orchestrator, accounts: &[String]) -> Vec<CycleReport> {
    let reports = orchestrator.run_accounts(accounts).await;

    for report in &reports {
        println!("{report}");
        print_trade_history(orchestrator, &report.account_id).await;
        println!();
    }

    reports
}

async fn print_trade_history(orchestrator: &Orchestrator, account_id: &str) {
    match orchestrator.ledger().trade_history(account_id).await {
        Ok(history) => {
            println!("History:   {} trade request(s) on record", history.len());
            if let Some(last) = history.last() {
                let at = i64::try_from(last.timestamp)
                    .map(chrono::DateTime::from_timestamp_nanos)
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|_| last.timestamp.to_string());
                println!("  latest:  {} {} {} at {at}", last.action, last.amount, last.asset);
            }
        }
        Err(e) => warn!(account = account_id, error = %e, "Could not read trade history"),
    }
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("portfolio_advisor=info"));

    let json_logging = std::env::var("ADVISOR_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
