use rust_decimal::Decimal;

use crate::cost::{self, CallCost, CostTable};
use crate::error::{Error, Result};

/// Token counts as reported by the provider.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn total_tokens(&self) -> Result<u64> {
        self.input_tokens
            .checked_add(self.output_tokens)
            .ok_or_else(|| Error::malformed("total token count overflows"))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UsageMetrics {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    /// `None` when the provider has no cost table.
    pub cost: Option<CallCost>,
}

impl UsageMetrics {
    pub fn new(tokens: TokenUsage, cost_table: Option<&CostTable>) -> Result<Self> {
        Ok(Self {
            input_tokens: tokens.input_tokens,
            output_tokens: tokens.output_tokens,
            total_tokens: tokens.total_tokens()?,
            cost: cost::compute(&tokens, cost_table)?,
        })
    }

    pub fn input_cost(&self) -> Option<Decimal> {
        self.cost.map(|c| c.input)
    }

    pub fn output_cost(&self) -> Option<Decimal> {
        self.cost.map(|c| c.output)
    }

    pub fn total_cost(&self) -> Option<Decimal> {
        self.cost.map(|c| c.total)
    }
}
