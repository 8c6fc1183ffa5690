//! Liquidity pool scoring.
//!
//! Score = `apy * (1 - 1 / (tvl / tvl_normalizer))` for pools above the
//! minimum TVL; everything else scores zero. The highest score among
//! qualifying pools wins, and on a tie the pool listed first wins.
//! Pools at or below the minimum TVL are only considered when no pool
//! qualifies. Conservative accounts are never shown a winner yielding
//! less than `min_safe_apy`.

use tracing::{debug, info};

use crate::config::LiquidityConfig;
use crate::types::{LiquidityPool, RiskTolerance, StakeRecommendation};

/// A pool together with its computed score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPool<'a> {
    pub pool: &'a LiquidityPool,
    pub score: f64,
}

pub struct LiquidityScorer {
    config: LiquidityConfig,
}

impl LiquidityScorer {
    pub fn new(config: LiquidityConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LiquidityConfig {
        &self.config
    }

    pub fn qualifies(&self, pool: &LiquidityPool) -> bool {
        pool.tvl > self.config.min_tvl
    }

    pub fn score(&self, pool: &LiquidityPool) -> f64 {
        if !self.qualifies(pool) {
            return 0.0;
        }
        pool.apy * (1.0 - 1.0 / (pool.tvl / self.config.tvl_normalizer))
    }

    /// Best-scoring pool. Qualifying pools always beat sub-threshold ones,
    /// whatever their score. Within a group pools are scanned in input
    /// order and only a strictly greater score replaces the current best.
    pub fn select<'a>(&self, pools: &'a [LiquidityPool]) -> Option<ScoredPool<'a>> {
        let mut best: Option<ScoredPool<'a>> = None;
        let mut best_qualifies = false;
        for pool in pools {
            let score = self.score(pool);
            let qualifies = self.qualifies(pool);
            debug!(pair = %pool.pair, apy = pool.apy, tvl = pool.tvl, score, qualifies, "Pool scored");
            let replace = match &best {
                None => true,
                Some(current) => match (qualifies, best_qualifies) {
                    (true, false) => true,
                    (false, true) => false,
                    _ => score > current.score,
                },
            };
            if replace {
                best = Some(ScoredPool { pool, score });
                best_qualifies = qualifies;
            }
        }
        best
    }

    /// Recommend a pool for an account with the given risk tolerance.
    pub fn recommend(&self, pools: &[LiquidityPool], risk: RiskTolerance) -> StakeRecommendation {
        let Some(best) = self.select(pools) else {
            info!("No pools available");
            return StakeRecommendation::NoSafeOption;
        };

        if risk.value() <= self.config.conservative_ceiling && best.pool.apy < self.config.min_safe_apy {
            info!(
                pair = %best.pool.pair,
                apy = best.pool.apy,
                risk = risk.value(),
                "Best pool below safe yield for conservative account"
            );
            return StakeRecommendation::NoSafeOption;
        }

        info!(pair = %best.pool.pair, apy = best.pool.apy, score = best.score, "Pool selected");
        StakeRecommendation::Stake {
            pair: best.pool.pair.clone(),
            apy: best.pool.apy,
        }
    }
}
