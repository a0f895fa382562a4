use crate::error::PricingError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Suffix marking a model id as eligible for long-context (200K+) pricing
pub const LONG_CONTEXT_MARKER: &str = "[1m]";

/// Prompt-side token count above which long-context rates apply (strictly greater)
pub const LONG_CONTEXT_THRESHOLD: i64 = 200_000;

/// Region prefixes of cross-region Bedrock inference profiles
const REGION_PREFIXES: &[&str] = &["us.", "eu.", "apac.", "global."];

/// Whether the raw model id carries the long-context marker
pub fn is_long_context_model(model_id: &str) -> bool {
    model_id.trim().ends_with(LONG_CONTEXT_MARKER)
}

/// Model id with the long-context marker stripped
pub fn canonical_model_id(model_id: &str) -> &str {
    let trimmed = model_id.trim();
    trimmed
        .strip_suffix(LONG_CONTEXT_MARKER)
        .unwrap_or(trimmed)
}

/// Per-token prices for one model
///
/// Base prices are always present (a missing cache price in the source
/// document is stored as 0). Tier prices are optional per field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RateCard {
    pub input_cost: f64,
    pub output_cost: f64,
    pub cache_create_cost: f64,
    pub cache_read_cost: f64,
    pub input_cost_above_200k: Option<f64>,
    pub output_cost_above_200k: Option<f64>,
    pub cache_create_cost_above_200k: Option<f64>,
    pub cache_read_cost_above_200k: Option<f64>,
    pub cache_create_cost_above_1hr: Option<f64>,
    pub cache_create_cost_above_1hr_above_200k: Option<f64>,
}

impl RateCard {
    /// Check every price is a finite, non-negative number
    pub fn validate(&self) -> Result<(), String> {
        let fields = [
            ("input_cost", Some(self.input_cost)),
            ("output_cost", Some(self.output_cost)),
            ("cache_create_cost", Some(self.cache_create_cost)),
            ("cache_read_cost", Some(self.cache_read_cost)),
            ("input_cost_above_200k", self.input_cost_above_200k),
            ("output_cost_above_200k", self.output_cost_above_200k),
            ("cache_create_cost_above_200k", self.cache_create_cost_above_200k),
            ("cache_read_cost_above_200k", self.cache_read_cost_above_200k),
            ("cache_create_cost_above_1hr", self.cache_create_cost_above_1hr),
            (
                "cache_create_cost_above_1hr_above_200k",
                self.cache_create_cost_above_1hr_above_200k,
            ),
        ];

        for (name, value) in fields {
            if let Some(v) = value {
                if !v.is_finite() || v < 0.0 {
                    return Err(format!("{} must be a non-negative number, got {}", name, v));
                }
            }
        }
        Ok(())
    }

    /// Whether any 200K+ tier price is present
    pub fn has_long_context_tier(&self) -> bool {
        self.input_cost_above_200k.is_some()
            || self.output_cost_above_200k.is_some()
            || self.cache_create_cost_above_200k.is_some()
            || self.cache_read_cost_above_200k.is_some()
            || self.cache_create_cost_above_1hr_above_200k.is_some()
    }
}

/// Where a published catalog came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogOrigin {
    /// Placeholder before anything was loaded
    Empty,
    Remote,
    LocalFile,
    Cache,
    Fallback,
}

impl std::fmt::Display for CatalogOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Empty => "empty",
            Self::Remote => "remote",
            Self::LocalFile => "local_file",
            Self::Cache => "cache",
            Self::Fallback => "fallback",
        };
        f.write_str(name)
    }
}

/// Immutable snapshot of all rate cards
///
/// Never mutated once published; a refresh builds a new one and swaps the
/// reference.
#[derive(Debug, Clone)]
pub struct RateCatalog {
    cards: HashMap<String, RateCard>,
    loaded_at: DateTime<Utc>,
    checksum: String,
    origin: CatalogOrigin,
}

impl RateCatalog {
    pub fn new(cards: HashMap<String, RateCard>, checksum: String, origin: CatalogOrigin) -> Self {
        Self {
            cards,
            loaded_at: Utc::now(),
            checksum,
            origin,
        }
    }

    pub fn empty() -> Self {
        Self::new(HashMap::new(), String::new(), CatalogOrigin::Empty)
    }

    /// Look up a rate card by canonical id
    ///
    /// Tries the exact id, then the lowercase id, then the id without a
    /// Bedrock region prefix.
    pub fn lookup(&self, canonical_id: &str) -> Option<&RateCard> {
        if let Some(card) = self.cards.get(canonical_id) {
            return Some(card);
        }

        let lower = canonical_id.to_lowercase();
        if let Some(card) = self.cards.get(&lower) {
            return Some(card);
        }

        REGION_PREFIXES
            .iter()
            .filter_map(|prefix| lower.strip_prefix(prefix))
            .find_map(|stripped| self.cards.get(stripped))
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    /// Verified SHA-256 of the source document (hex)
    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    pub fn origin(&self) -> CatalogOrigin {
        self.origin
    }
}

/// Token usage of one completed request
///
/// Deserializes directly from an Anthropic `usage` object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    #[serde(default)]
    pub input_tokens: i64,
    #[serde(default)]
    pub output_tokens: i64,
    /// Aggregate cache-creation tokens; always used for the threshold
    #[serde(default, rename = "cache_creation_input_tokens")]
    pub cache_creation_tokens: i64,
    #[serde(default, rename = "cache_read_input_tokens")]
    pub cache_read_tokens: i64,
    #[serde(
        default,
        rename = "cache_creation",
        skip_serializing_if = "Option::is_none"
    )]
    pub cache_creation_breakdown: Option<CacheCreationBreakdown>,
}

/// Split of cache-creation tokens by retention duration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheCreationBreakdown {
    #[serde(default, rename = "ephemeral_5m_input_tokens")]
    pub ephemeral_5m_tokens: i64,
    #[serde(default, rename = "ephemeral_1h_input_tokens")]
    pub ephemeral_1h_tokens: i64,
}

impl UsageRecord {
    pub fn new(input_tokens: i64, output_tokens: i64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            ..Default::default()
        }
    }

    pub fn with_cache(mut self, creation_tokens: i64, read_tokens: i64) -> Self {
        self.cache_creation_tokens = creation_tokens;
        self.cache_read_tokens = read_tokens;
        self
    }

    pub fn with_breakdown(mut self, ephemeral_5m_tokens: i64, ephemeral_1h_tokens: i64) -> Self {
        self.cache_creation_breakdown = Some(CacheCreationBreakdown {
            ephemeral_5m_tokens,
            ephemeral_1h_tokens,
        });
        self
    }

    /// input + cache creation (aggregate) + cache read
    pub fn prompt_total(&self) -> i64 {
        self.input_tokens
            .saturating_add(self.cache_creation_tokens)
            .saturating_add(self.cache_read_tokens)
    }

    /// Reject negative token counts
    pub fn validate(&self) -> Result<(), PricingError> {
        let mut counts = vec![
            ("input_tokens", self.input_tokens),
            ("output_tokens", self.output_tokens),
            ("cache_creation_input_tokens", self.cache_creation_tokens),
            ("cache_read_input_tokens", self.cache_read_tokens),
        ];
        if let Some(breakdown) = &self.cache_creation_breakdown {
            counts.push(("ephemeral_5m_input_tokens", breakdown.ephemeral_5m_tokens));
            counts.push(("ephemeral_1h_input_tokens", breakdown.ephemeral_1h_tokens));
        }

        for (name, value) in counts {
            if value < 0 {
                return Err(PricingError::InvalidUsage(format!(
                    "{} must be >= 0, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// Unit prices actually applied to each category
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedPricing {
    pub input: f64,
    pub output: f64,
    pub cache_create: f64,
    pub cache_read: f64,
    /// Rate for the 1-hour retention bucket
    pub ephemeral_1h: f64,
}

/// Cost breakdown for a request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostBreakdown {
    pub has_pricing: bool,
    pub is_long_context_request: bool,
    pub pricing: AppliedPricing,
    pub input_cost: f64,
    pub output_cost: f64,
    pub cache_create_cost: f64,
    pub cache_read_cost: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ephemeral_5m_cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ephemeral_1h_cost: Option<f64>,
    pub total_cost: f64,
}

impl CostBreakdown {
    /// Create a zero-cost breakdown (no pricing data)
    pub fn zero() -> Self {
        Self::default()
    }

    /// Calculate total cost from components
    pub fn calculate_total(&mut self) {
        self.total_cost =
            self.input_cost + self.output_cost + self.cache_create_cost + self.cache_read_cost;
    }
}
