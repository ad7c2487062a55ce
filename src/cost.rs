//! Per-call cost in exact decimal arithmetic.

use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::usage::TokenUsage;

const TOKENS_PER_PRICE_UNIT: u64 = 1_000_000;
const DISPLAY_DECIMALS: u32 = 8;
const UNKNOWN_COST: &str = "n/a";

/// Price in USD per one million tokens.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct CostTable {
    #[serde(deserialize_with = "decimal_from_json")]
    pub input: Decimal,
    #[serde(deserialize_with = "decimal_from_json")]
    pub output: Decimal,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallCost {
    pub input: Decimal,
    pub output: Decimal,
    pub total: Decimal,
}

/// Cost of one call, or `None` when the provider has no cost table.
pub fn compute(usage: &TokenUsage, table: Option<&CostTable>) -> Result<Option<CallCost>> {
    let Some(table) = table else {
        return Ok(None);
    };
    let input = price(usage.input_tokens, table.input)?;
    let output = price(usage.output_tokens, table.output)?;
    let total = input
        .checked_add(output)
        .ok_or_else(|| Error::Aggregation(format!("{} + {} overflows", input, output)))?;
    Ok(Some(CallCost {
        input,
        output,
        total,
    }))
}

fn price(tokens: u64, per_million: Decimal) -> Result<Decimal> {
    Decimal::from(tokens)
        .checked_div(Decimal::from(TOKENS_PER_PRICE_UNIT))
        .and_then(|millions| millions.checked_mul(per_million))
        .ok_or_else(|| {
            Error::Aggregation(format!(
                "{} tokens at {} per million overflows",
                tokens, per_million
            ))
        })
}

/// Display form: eight fractional digits, comma as decimal separator.
pub fn format_cost(cost: Option<Decimal>) -> String {
    match cost {
        Some(value) => format!(
            "{:.8}",
            value.round_dp_with_strategy(DISPLAY_DECIMALS, RoundingStrategy::MidpointNearestEven)
        )
        .replace('.', ","),
        None => UNKNOWN_COST.to_string(),
    }
}

/// Running cost across a whole batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CostTotal {
    total: Decimal,
}

impl CostTotal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails rather than skipping a call whose cost is unknown.
    pub fn add(&mut self, cost: Option<&CallCost>, provider: &str) -> Result<()> {
        let cost = cost.ok_or_else(|| {
            Error::Aggregation(format!("provider `{}` has no cost_by_million table", provider))
        })?;
        self.total = self
            .total
            .checked_add(cost.total)
            .ok_or_else(|| Error::Aggregation("running total overflows".to_string()))?;
        Ok(())
    }

    pub fn value(&self) -> Decimal {
        self.total
    }
}

fn decimal_from_json<'de, D>(deserializer: D) -> std::result::Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let text = match &value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        other => return Err(D::Error::custom(format!("expected a price, got {}", other))),
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|e| D::Error::custom(format!("invalid price `{}`: {}", text, e)))
}
