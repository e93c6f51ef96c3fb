//! Token and cost accounting
//!
//! Passive aggregation of the usage metadata model calls attach to their
//! responses. Nothing here estimates or prices tokens itself.

use crate::models::{Message, Usage};
use serde::{Deserialize, Serialize};

/// Usage summed over a set of messages
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageTotals {
    pub usage: Usage,
    /// Messages that carried usage metadata
    pub reporting_messages: usize,
}

impl UsageTotals {
    pub fn record(&mut self, usage: &Usage) {
        self.usage += *usage;
        self.reporting_messages += 1;
    }

    pub fn from_messages(messages: &[Message]) -> Self {
        let mut totals = Self::default();
        for usage in messages.iter().filter_map(Message::usage) {
            totals.record(usage);
        }
        totals
    }
}
