//! Per-model token cost lookup against a static rate table.

use lazy_static::lazy_static;
use std::collections::HashMap;

use crate::types::Money;

#[derive(Debug, Clone, Copy)]
pub struct ModelRate {
    pub in_per_1k: f64,
    pub out_per_1k: f64,
}

lazy_static! {
    /// A small, intentionally non-exhaustive table of chat-completion
    /// model rates, in dollars per 1K tokens. Unmapped models cost 0 and
    /// log a warning rather than panicking or guessing.
    static ref COST_BY_MODEL: HashMap<&'static str, ModelRate> = {
        let mut m = HashMap::new();
        m.insert(
            "gpt-4o",
            ModelRate {
                in_per_1k: 0.0025,
                out_per_1k: 0.01,
            },
        );
        m.insert(
            "gpt-4o-mini",
            ModelRate {
                in_per_1k: 0.00015,
                out_per_1k: 0.0006,
            },
        );
        m.insert(
            "gpt-4-turbo",
            ModelRate {
                in_per_1k: 0.01,
                out_per_1k: 0.03,
            },
        );
        m.insert(
            "claude-3-5-sonnet-20241022",
            ModelRate {
                in_per_1k: 0.003,
                out_per_1k: 0.015,
            },
        );
        m
    };
}

/// `cost = 0.001 * (promptTokens * inPer1K + completionTokens * outPer1K)`.
pub fn token_cost(model_name: &str, prompt_tokens: u32, completion_tokens: u32) -> Money {
    match COST_BY_MODEL.get(model_name) {
        Some(rate) => Money(
            0.001 * (prompt_tokens as f64 * rate.in_per_1k + completion_tokens as f64 * rate.out_per_1k),
        ),
        None => {
            tracing::warn!(model = model_name, "no cost rate for model, charging $0.0");
            Money(0.0)
        }
    }
}
