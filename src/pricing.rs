use serde::Serialize;

use crate::constants;

/// Dollar price per million tokens, fixed for the life of the process.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PricingModel {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl Default for PricingModel {
    fn default() -> Self {
        Self {
            input_per_million: constants::DEFAULT_INPUT_PER_MILLION,
            output_per_million: constants::DEFAULT_OUTPUT_PER_MILLION,
        }
    }
}

impl PricingModel {
    pub fn new(input_per_million: f64, output_per_million: f64) -> Self {
        Self {
            input_per_million,
            output_per_million,
        }
    }

    /// Pricing with any `MENTOR_*_PER_MILLION` overrides applied.
    pub fn from_env() -> Self {
        Self::new(*constants::INPUT_PER_MILLION, *constants::OUTPUT_PER_MILLION)
    }

    /// Approximate cost of one reply. No rounding happens here; see [`format_cost`].
    pub fn estimate_cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 / 1_000_000.0) * self.input_per_million
            + (output_tokens as f64 / 1_000_000.0) * self.output_per_million
    }
}

pub fn format_cost(cost: f64) -> String {
    format!("${:.5}", cost)
}
