use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Running aggregate of engine activity. Reset only at process start.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AgentMetrics {
    /// Offers that went through the pipeline.
    pub total_processed: u64,
    /// Agent quotes that reached a terminal status.
    pub quotes_generated: u64,
    /// Share of resolved agent quotes that were accepted, 0.0 to 1.0.
    pub acceptance_rate: Decimal,
    /// Mean wall time of one pipeline pass.
    pub average_response_time_ms: Decimal,
    /// 0.0 to 1.0, grows with every resolved agent quote.
    pub learning_progress: Decimal,
}

impl AgentMetrics {
    /// Fold one pipeline pass into the running mean response time.
    pub fn record_processed(&mut self, elapsed_ms: u64) {
        self.total_processed += 1;
        let n = Decimal::from(self.total_processed);
        let previous = self.average_response_time_ms * (n - Decimal::ONE);
        self.average_response_time_ms = (previous + Decimal::from(elapsed_ms)) / n;
    }
}
