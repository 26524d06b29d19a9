//! Service configuration
//!
//! Loaded from a TOML file with environment-variable overrides. All
//! confidence thresholds live in one place (`MatchThresholds`) so the
//! recognizer, resolvers and classifier cannot drift apart.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// AI text service configuration (OpenAI-style chat completion endpoint)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    /// When false the AI recognizer and AI matcher report "no result"
    /// and the deterministic paths carry the pipeline
    pub enabled: bool,
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    /// Per-call timeout; the pipeline makes a single attempt then falls back
    pub timeout_ms: u64,
    /// Upper bound on catalog candidates embedded in one matching prompt
    pub max_candidates: usize,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "https://api.deepseek.com".to_string(),
            api_key: String::new(),
            model: "deepseek-chat".to_string(),
            timeout_ms: 30_000,
            max_candidates: 400,
        }
    }
}

/// Named confidence thresholds for every gating decision in the pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchThresholds {
    /// Below this the AI header mapping is discarded for the rule fallback
    pub ai_header_min: f64,
    /// Exact-key (SKU / customer code) acceptance
    pub exact_key_accept: f64,
    /// Product name match acceptance (deliberately strict)
    pub product_name_accept: f64,
    /// Customer name match acceptance
    pub customer_name_accept: f64,
    /// Customer phone match acceptance
    pub customer_phone_accept: f64,
    /// Floor under fuzzy similarity scores
    pub fuzzy_floor: f64,
    /// Default rejection floor for manual-review routing; overridable per upload
    pub manual_review_min: f64,
    /// Weighted-combination weights (customer code / name / phone)
    pub combo_code_weight: f64,
    pub combo_name_weight: f64,
    pub combo_phone_weight: f64,
}

impl Default for MatchThresholds {
    fn default() -> Self {
        Self {
            ai_header_min: 0.5,
            exact_key_accept: 0.8,
            product_name_accept: 0.95,
            customer_name_accept: 0.6,
            customer_phone_accept: 0.7,
            fuzzy_floor: 0.1,
            manual_review_min: 0.5,
            combo_code_weight: 0.5,
            combo_name_weight: 0.3,
            combo_phone_weight: 0.2,
        }
    }
}

/// Top-level service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub bind_addr: String,
    pub database_path: String,
    /// Default line-item unit when the row does not supply one
    pub default_unit: String,
    pub ai: AiConfig,
    pub thresholds: MatchThresholds,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:5840".to_string(),
            database_path: "orderflow.db".to_string(),
            default_unit: "unit".to_string(),
            ai: AiConfig::default(),
            thresholds: MatchThresholds::default(),
        }
    }
}

impl ServiceConfig {
    /// Load from TOML file (missing file = defaults), then apply
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) if p.exists() => {
                let content = std::fs::read_to_string(p)
                    .map_err(|e| Error::Config(format!("Read config failed: {}", e)))?;
                toml::from_str(&content)
                    .map_err(|e| Error::Config(format!("Parse config failed: {}", e)))?
            }
            _ => Self::default(),
        };

        if let Ok(addr) = std::env::var("ORDERFLOW_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Ok(db) = std::env::var("ORDERFLOW_DATABASE_PATH") {
            config.database_path = db;
        }
        if let Ok(key) = std::env::var("ORDERFLOW_AI_API_KEY") {
            if !key.trim().is_empty() {
                config.ai.api_key = key;
                config.ai.enabled = true;
            }
        }
        if let Ok(url) = std::env::var("ORDERFLOW_AI_BASE_URL") {
            config.ai.base_url = url;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = ServiceConfig::default();
        assert!(!config.ai.enabled);
        assert_eq!(config.thresholds.ai_header_min, 0.5);
        assert_eq!(config.thresholds.product_name_accept, 0.95);
        assert_eq!(config.thresholds.customer_name_accept, 0.6);
        let w = &config.thresholds;
        assert!((w.combo_code_weight + w.combo_name_weight + w.combo_phone_weight - 1.0).abs() < 1e-9);
    }

    #[test]
    fn toml_round_trip() {
        let config = ServiceConfig::default();
        let text = toml::to_string(&config).unwrap();
        let parsed: ServiceConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.bind_addr, config.bind_addr);
        assert_eq!(parsed.thresholds.fuzzy_floor, config.thresholds.fuzzy_floor);
    }
}
