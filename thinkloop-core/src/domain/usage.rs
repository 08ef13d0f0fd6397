use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};

/// Token usage reported by the backend for one or more turns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl Usage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn add(&mut self, other: Usage) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
    }

    pub fn total(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

/// Cumulative figures across every operation that shares an accumulator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageTotals {
    pub total_input: u64,
    pub total_output: u64,
    pub estimated_thinking: u64,
    pub call_count: u64,
}

/// Reasoning characters per token used for the thinking estimate.
const THINKING_CHARS_PER_TOKEN: u64 = 4;

/// Caller-owned usage accumulator shared across concurrent operations.
#[derive(Debug, Clone, Default)]
pub struct UsageAccumulator {
    inner: Arc<Mutex<UsageTotals>>,
}

impl UsageAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in one finished operation.
    pub fn record(&self, usage: Usage, thinking_chars: usize) -> UsageTotals {
        let mut totals = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        totals.total_input = totals.total_input.saturating_add(usage.input_tokens);
        totals.total_output = totals.total_output.saturating_add(usage.output_tokens);
        totals.estimated_thinking = totals
            .estimated_thinking
            .saturating_add(thinking_chars as u64 / THINKING_CHARS_PER_TOKEN);
        totals.call_count += 1;
        *totals
    }

    /// Bump the input counter from a character count before real usage arrives.
    pub fn add_input_estimate(&self, chars: usize) -> UsageTotals {
        let mut totals = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        totals.total_input = totals
            .total_input
            .saturating_add(chars as u64 / THINKING_CHARS_PER_TOKEN);
        *totals
    }

    pub fn snapshot(&self) -> UsageTotals {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
