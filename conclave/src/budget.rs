//! Budget tracking — token, cost, and wall-clock ceilings shared across
//! a run tree.
//!
//! One `BudgetTracker` is attached to a root context and shared by
//! reference with every descendant. Enforcement happens after each
//! call: usage is always counted, then the executor checks for a
//! breach, so the triggering call's consumption is never lost.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::chat::Usage;

/// Ceilings for one run tree. Unset limits are unenforced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Budget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_cost_usd: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_duration: Option<Duration>,
}

impl Budget {
    /// No ceilings at all.
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn with_max_tokens(mut self, max_tokens: u64) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_max_cost_usd(mut self, max_cost_usd: f64) -> Self {
        self.max_cost_usd = Some(max_cost_usd);
        self
    }

    pub fn with_max_duration(mut self, max_duration: Duration) -> Self {
        self.max_duration = Some(max_duration);
        self
    }
}

/// Accumulated consumption against a budget.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BudgetUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub cost_usd: f64,
    /// Number of settled model calls.
    pub calls: u64,
}

/// Which ceiling was crossed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetBreach {
    Tokens { used: u64, limit: u64 },
    Cost { used_usd: f64, limit_usd: f64 },
    Duration { elapsed_ms: u64, limit_ms: u64 },
}

impl std::fmt::Display for BudgetBreach {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BudgetBreach::Tokens { used, limit } => {
                write!(f, "tokens ({} used, limit {})", used, limit)
            }
            BudgetBreach::Cost { used_usd, limit_usd } => {
                write!(f, "cost (${:.4} used, limit ${:.4})", used_usd, limit_usd)
            }
            BudgetBreach::Duration { elapsed_ms, limit_ms } => {
                write!(f, "duration ({} ms elapsed, limit {} ms)", elapsed_ms, limit_ms)
            }
        }
    }
}

/// External lookup estimating call cost from token counts.
pub trait PriceTable: Send + Sync {
    /// Cost in USD, or `None` when the provider/model is unknown.
    fn estimate_cost(
        &self,
        provider: &str,
        model: &str,
        input_tokens: u64,
        output_tokens: u64,
    ) -> Option<f64>;
}

/// USD per million tokens, input and output priced separately.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelRate {
    pub input_per_mtok: f64,
    pub output_per_mtok: f64,
}

/// In-memory price table keyed by provider/model.
#[derive(Debug, Clone, Default)]
pub struct StaticPriceTable {
    rates: HashMap<(String, String), ModelRate>,
}

impl StaticPriceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rate(mut self, provider: &str, model: &str, rate: ModelRate) -> Self {
        self.rates
            .insert((provider.to_string(), model.to_string()), rate);
        self
    }
}

impl PriceTable for StaticPriceTable {
    fn estimate_cost(
        &self,
        provider: &str,
        model: &str,
        input_tokens: u64,
        output_tokens: u64,
    ) -> Option<f64> {
        let rate = self.rates.get(&(provider.to_string(), model.to_string()))?;
        Some(
            input_tokens as f64 * rate.input_per_mtok / 1_000_000.0
                + output_tokens as f64 * rate.output_per_mtok / 1_000_000.0,
        )
    }
}

/// Thread-safe accumulator enforcing a `Budget`.
pub struct BudgetTracker {
    budget: Budget,
    price_table: Option<Arc<dyn PriceTable>>,
    usage: Mutex<BudgetUsage>,
    started: Instant,
}

impl BudgetTracker {
    pub fn new(budget: Budget) -> Self {
        Self {
            budget,
            price_table: None,
            usage: Mutex::new(BudgetUsage::default()),
            started: Instant::now(),
        }
    }

    /// Attach a price table so settled calls accumulate cost as well.
    pub fn with_price_table(mut self, table: Arc<dyn PriceTable>) -> Self {
        self.price_table = Some(table);
        self
    }

    pub fn budget(&self) -> &Budget {
        &self.budget
    }

    /// Count one settled call: tokens always, cost when estimable.
    pub fn record_call(&self, provider: &str, model: &str, usage: &Usage) {
        let cost = self.price_table.as_ref().and_then(|table| {
            table.estimate_cost(provider, model, usage.input_tokens, usage.output_tokens)
        });
        let mut acc = self.lock();
        acc.input_tokens += usage.input_tokens;
        acc.output_tokens += usage.output_tokens;
        acc.total_tokens += usage.total_tokens;
        acc.calls += 1;
        if let Some(cost) = cost {
            acc.cost_usd += cost;
        }
    }

    /// Snapshot of the accumulated usage.
    pub fn usage(&self) -> BudgetUsage {
        *self.lock()
    }

    /// Wall-clock time since the tracker was created.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// First crossed ceiling, if any. Synchronous; callers decide when
    /// to check.
    pub fn breach(&self) -> Option<BudgetBreach> {
        let usage = self.usage();
        if let Some(limit) = self.budget.max_tokens {
            if usage.total_tokens > limit {
                return Some(BudgetBreach::Tokens {
                    used: usage.total_tokens,
                    limit,
                });
            }
        }
        if let Some(limit) = self.budget.max_cost_usd {
            if usage.cost_usd > limit {
                return Some(BudgetBreach::Cost {
                    used_usd: usage.cost_usd,
                    limit_usd: limit,
                });
            }
        }
        if let Some(limit) = self.budget.max_duration {
            let elapsed = self.started.elapsed();
            if elapsed > limit {
                return Some(BudgetBreach::Duration {
                    elapsed_ms: elapsed.as_millis() as u64,
                    limit_ms: limit.as_millis() as u64,
                });
            }
        }
        None
    }

    pub fn is_exceeded(&self) -> bool {
        self.breach().is_some()
    }

    fn lock(&self) -> MutexGuard<'_, BudgetUsage> {
        match self.usage.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
