//! Fallback price table (USD per 1000 tokens).

/// Input/output rates, USD per 1000 tokens.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RatePair {
    pub input: f64,
    pub output: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RateRule {
    pub needle: &'static str,
    pub rates: RatePair,
}

/// Ordered substring rules; the first rule whose needle occurs in the model id wins.
#[derive(Clone, Debug, PartialEq)]
pub struct PriceTable {
    rules: Vec<RateRule>,
    default: RatePair,
}

impl Default for PriceTable {
    fn default() -> Self {
        Self {
            rules: vec![
                RateRule {
                    needle: "gpt-4",
                    rates: RatePair { input: 0.03, output: 0.06 },
                },
                RateRule {
                    needle: "gpt-3.5-turbo",
                    rates: RatePair { input: 0.001, output: 0.002 },
                },
                RateRule {
                    needle: "claude",
                    rates: RatePair { input: 0.008, output: 0.024 },
                },
            ],
            default: RatePair { input: 0.002, output: 0.004 },
        }
    }
}

impl PriceTable {
    pub fn new(rules: Vec<RateRule>, default: RatePair) -> Self {
        Self { rules, default }
    }

    pub fn rates_for(&self, model: &str) -> RatePair {
        self.rules
            .iter()
            .find(|rule| model.contains(rule.needle))
            .map(|rule| rule.rates)
            .unwrap_or(self.default)
    }

    pub fn estimate(&self, model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
        let rates = self.rates_for(model);
        input_tokens as f64 / 1000.0 * rates.input + output_tokens as f64 / 1000.0 * rates.output
    }
}

/// Estimate with the built-in table.
pub fn estimate(model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
    PriceTable::default().estimate(model, input_tokens, output_tokens)
}
