//! Usage and cost accounting for cloud providers.
//!
//! Each provider owns a [`UsageTracker`]. Callers that want one total across
//! several providers pass the same `Arc<UsageTracker>` to each of them.

use serde::Serialize;
use std::sync::Mutex;

use crate::message::Usage;

/// Per-million-token prices in USD.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPricing {
    pub input_cost_per_million: f64,
    pub output_cost_per_million: f64,
}

impl ModelPricing {
    pub const fn new(input_cost_per_million: f64, output_cost_per_million: f64) -> Self {
        Self {
            input_cost_per_million,
            output_cost_per_million,
        }
    }

    pub fn calculate_cost(&self, usage: &Usage) -> f64 {
        let input_cost = (usage.input_tokens as f64 / 1_000_000.0) * self.input_cost_per_million;
        let output_cost =
            (usage.output_tokens as f64 / 1_000_000.0) * self.output_cost_per_million;
        input_cost + output_cost
    }
}

/// Look up pricing by longest matching model prefix. Unknown models cost nothing.
pub fn cost_from_table(table: &[(&str, ModelPricing)], model: &str, usage: &Usage) -> f64 {
    table
        .iter()
        .filter(|(prefix, _)| model.starts_with(prefix))
        .max_by_key(|(prefix, _)| prefix.len())
        .map(|(_, pricing)| pricing.calculate_cost(usage))
        .unwrap_or(0.0)
}

/// Snapshot of accumulated counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct UsageStats {
    pub total_requests: u64,
    pub total_tokens: u64,
    pub total_cost: f64,
}

/// Accumulates request, token and cost counters until reset.
#[derive(Debug, Default)]
pub struct UsageTracker {
    stats: Mutex<UsageStats>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, usage: Option<&Usage>, cost: f64) {
        if let Ok(mut stats) = self.stats.lock() {
            stats.total_requests += 1;
            stats.total_tokens += usage.map(|u| u.total_tokens).unwrap_or(0);
            stats.total_cost += cost;
        }
    }

    pub fn snapshot(&self) -> UsageStats {
        self.stats.lock().map(|s| *s).unwrap_or_default()
    }

    pub fn reset(&self) {
        if let Ok(mut stats) = self.stats.lock() {
            *stats = UsageStats::default();
        }
    }
}
