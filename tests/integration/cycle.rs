//! End-to-end account cycles against the in-memory ledger.

use std::sync::Arc;
use std::time::Duration;

use portfolio_advisor::engine::gate::ExecutionOutcome;
use portfolio_advisor::engine::{CycleReport, EngineConfig, Orchestrator, StageStatus};
use portfolio_advisor::ledger::codec::{self, PersistedRecommendation};
use portfolio_advisor::ledger::{methods, LedgerClient};
use portfolio_advisor::storage::{self, JournalEntry};
use portfolio_advisor::strategy::DecisionRecord;
use portfolio_advisor::types::{
    AgentError, AnalysisOutcome, LiquidityPool, Recommendation, RecommendationSet,
    StakeRecommendation, TradeAction,
};

use crate::fixtures::{portfolio, ShutdownOnPools, StaticPools, StaticPrices};
use crate::mock_ledger::InMemoryLedger;

fn orchestrator(ledger: &InMemoryLedger) -> Orchestrator {
    orchestrator_with_pools(ledger, StaticPools::fixture())
}

fn orchestrator_with_pools(ledger: &InMemoryLedger, pools: StaticPools) -> Orchestrator {
    Orchestrator::new(
        LedgerClient::new(Arc::new(ledger.clone()), Duration::from_secs(2)),
        Arc::new(StaticPrices::fixture()),
        Arc::new(pools),
        EngineConfig::default(),
    )
}

/// Recommendation text written while the account sat at a higher risk.
fn stale_buy() -> String {
    let set: RecommendationSet = [(
        "NEAR".to_string(),
        Recommendation { asset: "NEAR".into(), action: TradeAction::Buy, amount: 97 },
    )]
    .into_iter()
    .collect();
    codec::encode_analysis(&AnalysisOutcome::Analyzed(set)).unwrap()
}

fn executed(report: &CycleReport) -> usize {
    match report.execution.completed() {
        Some(ExecutionOutcome::Executed(exec)) => exec.executed.len(),
        _ => 0,
    }
}

#[tokio::test]
async fn test_balanced_account_full_cycle() {
    let ledger = InMemoryLedger::new();
    ledger.set_portfolio("alice.testnet", portfolio(5));

    let report = orchestrator(&ledger).run_cycle("alice.testnet").await;
    assert!(!report.has_failures(), "{report}");

    let set = report.analysis.completed().unwrap().recommendations().unwrap();
    assert_eq!(set.len(), 2);
    assert_eq!(set["NEAR"].amount, 97);
    assert_eq!(set["ETH"].amount, 4);

    // Trades submitted in asset order with the yocto-scaled amount
    let trades = ledger.writes_to(methods::REQUEST_TRADE);
    assert_eq!(trades.len(), 2);
    assert_eq!(trades[0].args["asset"], "ETH");
    assert_eq!(trades[0].args["action"], "sell");
    assert!(trades[0].args["amount"].is_number());
    assert_eq!(trades[0].trade_amount(), Some(4_000_000_000_000_000_000_000_000));
    assert_eq!(trades[1].trade_amount(), Some(97_000_000_000_000_000_000_000_000));
    assert_eq!(
        trades[1].raw_args,
        r#"{"asset":"NEAR","amount":97000000000000000000000000,"action":"buy"}"#
    );
    assert!(trades.iter().all(|t| t.signer == "alice.testnet"));
    assert!(trades.iter().all(|t| t.budget.deposit == 100_000_000_000_000_000_000_000));
    assert_eq!(ledger.history_len("alice.testnet"), 2);

    // The stake recommendation is written last and replaces the trade set
    let stored = ledger.stored_recommendation("alice.testnet").unwrap();
    assert_eq!(
        codec::decode(&stored).unwrap(),
        PersistedRecommendation::Stake(StakeRecommendation::Stake {
            pair: "NEAR-USDT".into(),
            apy: 12.5
        })
    );
}

#[tokio::test]
async fn test_stale_buy_never_executes_after_risk_drop() {
    let ledger = InMemoryLedger::new();
    ledger.set_portfolio("alice.testnet", portfolio(3));
    ledger.seed_recommendation("alice.testnet", &stale_buy());
    // Keep the stale text in place by rejecting this cycle's persist
    ledger.fail_writes_to(methods::SET_AI_RECOMMENDATION);

    let report = orchestrator(&ledger).run_cycle("alice.testnet").await;

    assert!(report.persist_recommendation.is_failed());
    assert_eq!(report.execution.completed(), Some(&ExecutionOutcome::NothingToExecute));
    assert!(ledger.writes_to(methods::REQUEST_TRADE).is_empty());
    assert_eq!(ledger.history_len("alice.testnet"), 0);
    assert!(report.has_failures());
}

#[tokio::test]
async fn test_stale_buy_executes_when_still_allowed() {
    let ledger = InMemoryLedger::new();
    ledger.set_portfolio("alice.testnet", portfolio(8));
    ledger.seed_recommendation("alice.testnet", &stale_buy());
    ledger.fail_writes_to(methods::SET_AI_RECOMMENDATION);

    let report = orchestrator(&ledger).run_cycle("alice.testnet").await;

    assert_eq!(executed(&report), 1);
    let trades = ledger.writes_to(methods::REQUEST_TRADE);
    assert_eq!(trades[0].args["asset"], "NEAR");
    assert_eq!(trades[0].args["action"], "buy");
}

#[tokio::test]
async fn test_malformed_stored_recommendation_isolated() {
    let ledger = InMemoryLedger::new();
    ledger.set_portfolio("alice.testnet", portfolio(5));
    ledger.seed_recommendation("alice.testnet", r#"{"NEAR":{"action":"buy","amount":97}}"#);
    ledger.fail_writes_to(methods::SET_AI_RECOMMENDATION);

    let report = orchestrator(&ledger).run_cycle("alice.testnet").await;

    assert!(report.analysis.completed().is_some());
    assert!(matches!(
        report.execution.error(),
        Some(AgentError::InvalidRecommendation(_))
    ));
    // Liquidity still ran; only its persist failed
    assert!(report.liquidity.completed().is_some());
    assert!(report.persist_stake.is_failed());
    assert!(ledger.writes_to(methods::REQUEST_TRADE).is_empty());
}

#[tokio::test]
async fn test_rejected_trade_does_not_stop_cycle() {
    let ledger = InMemoryLedger::new();
    ledger.set_portfolio("alice.testnet", portfolio(5));
    ledger.fail_writes_to(methods::REQUEST_TRADE);

    let report = orchestrator(&ledger).run_cycle("alice.testnet").await;

    assert_eq!(report.failed_trades(), 2);
    assert!(report.liquidity.completed().is_some());
    assert!(report.persist_stake.completed().is_some());
    assert!(report.has_failures());
}

#[tokio::test]
async fn test_empty_account_persists_no_assets() {
    let ledger = InMemoryLedger::new();

    let report = orchestrator(&ledger).run_cycle("bob.testnet").await;

    assert_eq!(report.analysis.completed(), Some(&AnalysisOutcome::NoAssets));
    let first = &ledger.writes_to(methods::SET_AI_RECOMMENDATION)[0];
    assert_eq!(first.args["recommendation"], r#"{"version":1,"kind":"no_assets"}"#);
    assert_eq!(first.signer, "bob.testnet");
    assert_eq!(report.execution.completed(), Some(&ExecutionOutcome::NothingToExecute));
    assert!(report.to_string().contains("No assets to analyze"));
}

#[tokio::test]
async fn test_repeat_cycles_encode_identically() {
    let ledger = InMemoryLedger::new();
    ledger.set_portfolio("alice.testnet", portfolio(5));
    let orch = orchestrator(&ledger);

    orch.run_cycle("alice.testnet").await;
    orch.run_cycle("alice.testnet").await;

    let persisted: Vec<String> = ledger
        .writes_to(methods::SET_AI_RECOMMENDATION)
        .into_iter()
        .map(|w| w.args["recommendation"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(persisted.len(), 4);
    assert_eq!(persisted[0], persisted[2]);
    assert_eq!(persisted[1], persisted[3]);
}

#[tokio::test]
async fn test_conservative_account_liquidity() {
    let ledger = InMemoryLedger::new();
    ledger.set_portfolio("carol.testnet", portfolio(4));

    // Fixture winner yields 12.5%, above the safe floor
    let report = orchestrator(&ledger).run_cycle("carol.testnet").await;
    assert!(matches!(
        report.liquidity.completed(),
        Some(StakeRecommendation::Stake { pair, .. }) if pair == "NEAR-USDT"
    ));

    // A low-yield winner is suppressed for the same account
    let low_yield = StaticPools::with(vec![LiquidityPool::new("ETH-USDT", 8.0, 5_000_000.0)]);
    let report = orchestrator_with_pools(&ledger, low_yield)
        .run_cycle("carol.testnet")
        .await;
    assert_eq!(report.liquidity.completed(), Some(&StakeRecommendation::NoSafeOption));
    let stored = ledger.stored_recommendation("carol.testnet").unwrap();
    assert_eq!(stored, r#"{"version":1,"kind":"no_safe_stake"}"#);
}

#[tokio::test]
async fn test_accounts_run_independently() {
    let ledger = InMemoryLedger::new();
    ledger.set_portfolio("alice.testnet", portfolio(5));
    ledger.set_portfolio("dave.testnet", portfolio(9));

    let accounts = vec!["alice.testnet".to_string(), "dave.testnet".to_string()];
    let reports = orchestrator(&ledger).run_accounts(&accounts).await;

    assert_eq!(reports.len(), 2);
    assert_eq!(executed(&reports[0]), 2);
    // Risk 9 allows the NEAR buy but not the ETH sell
    assert_eq!(executed(&reports[1]), 1);
    assert_eq!(ledger.history_len("alice.testnet"), 2);
    assert_eq!(ledger.history_len("dave.testnet"), 1);

    let trades = ledger.writes_to(methods::REQUEST_TRADE);
    assert_eq!(trades.iter().filter(|t| t.signer == "dave.testnet").count(), 1);
}

#[tokio::test]
async fn test_cancelled_cycle_stops_at_boundary() {
    let ledger = InMemoryLedger::new();
    ledger.set_portfolio("alice.testnet", portfolio(5));
    let (tx, rx) = tokio::sync::watch::channel(false);
    tx.send(true).unwrap();

    let report = orchestrator(&ledger).with_shutdown(rx).run_cycle("alice.testnet").await;

    assert_eq!(report.execution, StageStatus::Cancelled);
    assert!(ledger.writes().is_empty());
}

#[tokio::test]
async fn test_shutdown_mid_cycle_keeps_finished_stages() {
    let ledger = InMemoryLedger::new();
    ledger.set_portfolio("alice.testnet", portfolio(5));
    let (tx, rx) = tokio::sync::watch::channel(false);

    // Shutdown arrives while the liquidity stage is fetching pools
    let orch = Orchestrator::new(
        LedgerClient::new(Arc::new(ledger.clone()), Duration::from_secs(2)),
        Arc::new(StaticPrices::fixture()),
        Arc::new(ShutdownOnPools::new(StaticPools::fixture(), tx)),
        EngineConfig::default(),
    )
    .with_shutdown(rx);
    let report = orch.run_cycle("alice.testnet").await;

    assert!(report.analysis.completed().is_some());
    assert!(report.persist_recommendation.completed().is_some());
    assert_eq!(executed(&report), 2);
    assert!(matches!(
        report.liquidity.completed(),
        Some(StakeRecommendation::Stake { pair, .. }) if pair == "NEAR-USDT"
    ));
    assert_eq!(report.persist_stake, StageStatus::Cancelled);
    assert!(!report.has_failures());

    // Only the analysis was persisted; the trade set is still on the ledger
    assert_eq!(ledger.writes_to(methods::SET_AI_RECOMMENDATION).len(), 1);
    let stored = ledger.stored_recommendation("alice.testnet").unwrap();
    assert!(codec::decode(&stored).unwrap().into_trades().is_some());
}

#[tokio::test]
async fn test_ledger_scale_balances_do_not_fail_analysis() {
    let ledger = InMemoryLedger::new();
    ledger.set_portfolio_json(
        "erin.testnet",
        r#"{"assets": [
            {"name": "NEAR", "amount": 100000000000000000000000000000},
            {"name": "ETH", "amount": "-5"}
        ], "risk_tolerance": 5}"#,
    );

    let report = orchestrator(&ledger).run_cycle("erin.testnet").await;

    let set = report.analysis.completed().unwrap().recommendations().unwrap();
    assert_eq!(set.len(), 1);
    assert_eq!(set["NEAR"].action, TradeAction::Buy);
    assert!(report.decisions.iter().any(|d| matches!(
        d,
        DecisionRecord::Skipped { asset, reason: AgentError::InvalidAmount { .. } } if asset == "ETH"
    )));
    assert_eq!(executed(&report), 1);
    assert!(!report.has_failures(), "{report}");
}

#[tokio::test]
async fn test_trade_history_and_journal() {
    let ledger = InMemoryLedger::new();
    ledger.set_portfolio("alice.testnet", portfolio(5));
    let orch = orchestrator(&ledger);

    let report = orch.run_cycle("alice.testnet").await;

    let history = orch.ledger().trade_history("alice.testnet").await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].asset, "NEAR");
    assert_eq!(history[1].action, "buy");
    assert_eq!(history[1].amount, 97_000_000_000_000_000_000_000_000);

    let mut path = std::env::temp_dir();
    path.push(format!("advisor_it_journal_{}.jsonl", uuid::Uuid::new_v4()));
    let path = path.to_string_lossy().to_string();

    storage::append_journal(&report, Some(&path)).unwrap();
    let entries: Vec<JournalEntry> = storage::load_journal(Some(&path)).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].trades_executed, 2);
    assert!(!entries[0].has_failures);

    std::fs::remove_file(&path).unwrap();
}
