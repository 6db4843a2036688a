//! Model pricing table.
//!
//! Prices are USD per million tokens. The built-in entries are defaults;
//! sessions add or override models through configuration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Price of one model, per million tokens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPrice {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl ModelPrice {
    pub const fn new(input_per_million: f64, output_per_million: f64) -> Self {
        Self {
            input_per_million,
            output_per_million,
        }
    }

    pub fn is_valid(&self) -> bool {
        [self.input_per_million, self.output_per_million]
            .iter()
            .all(|p| p.is_finite() && *p >= 0.0)
    }
}

// Anthropic: Sonnet $3/$15, Haiku 3.5 $0.80/$4, Opus $15/$75
const CLAUDE_SONNET_4: ModelPrice = ModelPrice::new(3.0, 15.0);
const CLAUDE_35_HAIKU: ModelPrice = ModelPrice::new(0.80, 4.0);
const CLAUDE_OPUS_4: ModelPrice = ModelPrice::new(15.0, 75.0);
// OpenAI: GPT-4o $2.50/$10, GPT-4o-mini $0.15/$0.60
const GPT_4O: ModelPrice = ModelPrice::new(2.50, 10.0);
const GPT_4O_MINI: ModelPrice = ModelPrice::new(0.15, 0.60);
// Google: Gemini 2.0 Flash $0.10/$0.40
const GEMINI_20_FLASH: ModelPrice = ModelPrice::new(0.10, 0.40);

/// Model id → price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriceTable(BTreeMap<String, ModelPrice>);

impl Default for PriceTable {
    fn default() -> Self {
        let mut map = BTreeMap::new();
        map.insert("claude-sonnet-4".to_string(), CLAUDE_SONNET_4);
        map.insert("claude-3-5-haiku".to_string(), CLAUDE_35_HAIKU);
        map.insert("claude-opus-4".to_string(), CLAUDE_OPUS_4);
        map.insert("gpt-4o".to_string(), GPT_4O);
        map.insert("gpt-4o-mini".to_string(), GPT_4O_MINI);
        map.insert("gemini-2.0-flash".to_string(), GEMINI_20_FLASH);
        Self(map)
    }
}

impl PriceTable {
    /// Table with no entries.
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    pub fn get(&self, model: &str) -> Option<ModelPrice> {
        self.0.get(model).copied()
    }

    pub fn insert(&mut self, model: impl Into<String>, price: ModelPrice) {
        self.0.insert(model.into(), price);
    }

    pub fn with(mut self, model: impl Into<String>, price: ModelPrice) -> Self {
        self.insert(model, price);
        self
    }

    /// Known model ids, sorted.
    pub fn models(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table_has_builtins() {
        let table = PriceTable::default();
        assert_eq!(table.get("gpt-4o"), Some(ModelPrice::new(2.50, 10.0)));
        assert!(table.get("unknown").is_none());
        assert!(table.models().contains(&"claude-sonnet-4".to_string()));
    }

    #[test]
    fn test_override_replaces_entry() {
        let table = PriceTable::default().with("gpt-4o", ModelPrice::new(1.0, 2.0));
        assert_eq!(table.get("gpt-4o"), Some(ModelPrice::new(1.0, 2.0)));
    }

    #[test]
    fn test_price_validity() {
        assert!(ModelPrice::new(0.0, 1.0).is_valid());
        assert!(!ModelPrice::new(-1.0, 1.0).is_valid());
        assert!(!ModelPrice::new(f64::INFINITY, 1.0).is_valid());
    }
}
