use crate::error::PricingError;
use crate::pricing::models::RateCard;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// Documentation entry shipped at the top of LiteLLM-format price files
const SAMPLE_SPEC_KEY: &str = "sample_spec";

/// Individual model pricing data, as published by the price mirror
#[derive(Debug, Default, Deserialize)]
pub struct ModelPriceData {
    #[serde(default)]
    pub input_cost_per_token: Option<f64>,
    #[serde(default)]
    pub output_cost_per_token: Option<f64>,
    #[serde(default)]
    pub cache_creation_input_token_cost: Option<f64>,
    #[serde(default)]
    pub cache_read_input_token_cost: Option<f64>,
    #[serde(default)]
    pub input_cost_per_token_above_200k_tokens: Option<f64>,
    #[serde(default)]
    pub output_cost_per_token_above_200k_tokens: Option<f64>,
    #[serde(default)]
    pub cache_creation_input_token_cost_above_200k_tokens: Option<f64>,
    #[serde(default)]
    pub cache_read_input_token_cost_above_200k_tokens: Option<f64>,
    #[serde(default)]
    pub cache_creation_input_token_cost_above_1hr: Option<f64>,
    #[serde(default)]
    pub cache_creation_input_token_cost_above_1hr_above_200k_tokens: Option<f64>,
}

impl ModelPriceData {
    /// Convert to a rate card; `Ok(None)` when the entry has no token prices at all
    fn into_rate_card(self) -> Result<Option<RateCard>, String> {
        if self.input_cost_per_token.is_none() && self.output_cost_per_token.is_none() {
            return Ok(None);
        }

        let card = RateCard {
            input_cost: self.input_cost_per_token.unwrap_or(0.0),
            output_cost: self.output_cost_per_token.unwrap_or(0.0),
            cache_create_cost: self.cache_creation_input_token_cost.unwrap_or(0.0),
            cache_read_cost: self.cache_read_input_token_cost.unwrap_or(0.0),
            input_cost_above_200k: self.input_cost_per_token_above_200k_tokens,
            output_cost_above_200k: self.output_cost_per_token_above_200k_tokens,
            cache_create_cost_above_200k: self.cache_creation_input_token_cost_above_200k_tokens,
            cache_read_cost_above_200k: self.cache_read_input_token_cost_above_200k_tokens,
            cache_create_cost_above_1hr: self.cache_creation_input_token_cost_above_1hr,
            cache_create_cost_above_1hr_above_200k: self
                .cache_creation_input_token_cost_above_1hr_above_200k_tokens,
        };
        card.validate()?;
        Ok(Some(card))
    }
}

/// Result of parsing a catalog document
#[derive(Debug, Default)]
pub struct ParsedCatalog {
    pub cards: HashMap<String, RateCard>,
    /// Entries dropped because they failed to parse or validate
    pub skipped: usize,
    /// Entries without any token price (image models, embeddings with other units, ...)
    pub unpriced: usize,
}

/// Parse a catalog document into rate cards
///
/// Malformed entries are skipped one by one. The document as a whole is
/// rejected only if it is not a JSON object or yields no usable card.
pub fn parse_catalog(content: &[u8]) -> Result<ParsedCatalog, PricingError> {
    let data: serde_json::Map<String, serde_json::Value> = serde_json::from_slice(content)
        .map_err(|e| PricingError::MalformedCatalog(format!("Failed to parse pricing JSON: {}", e)))?;

    let mut parsed = ParsedCatalog::default();

    for (model_name, value) in data {
        if model_name == SAMPLE_SPEC_KEY {
            continue;
        }

        let card = serde_json::from_value::<ModelPriceData>(value)
            .map_err(|e| e.to_string())
            .and_then(ModelPriceData::into_rate_card);

        match card {
            Ok(Some(card)) => {
                parsed.cards.insert(model_name, card);
            }
            Ok(None) => parsed.unpriced += 1,
            Err(reason) => {
                debug!(model = %model_name, reason = %reason, "Skipping malformed rate card");
                parsed.skipped += 1;
            }
        }
    }

    if parsed.skipped > 0 {
        warn!(
            skipped = parsed.skipped,
            loaded = parsed.cards.len(),
            "Skipped malformed rate card entries"
        );
    }

    if parsed.cards.is_empty() {
        return Err(PricingError::MalformedCatalog(
            "Catalog contains no usable rate cards".to_string(),
        ));
    }

    debug!(
        loaded = parsed.cards.len(),
        unpriced = parsed.unpriced,
        "Parsed pricing catalog"
    );
    Ok(parsed)
}

/// Calculate SHA256 hash of content (lowercase hex)
pub fn calculate_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

/// Extract the digest from a checksum file
///
/// Accepts both a bare digest and `sha256sum` output (`<digest>  <filename>`).
pub fn parse_checksum(text: &str) -> Result<String, PricingError> {
    let digest = text
        .split_whitespace()
        .next()
        .ok_or_else(|| PricingError::MalformedCatalog("Checksum file is empty".to_string()))?
        .to_ascii_lowercase();

    if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(PricingError::MalformedCatalog(format!(
            "Checksum is not a SHA-256 hex digest: {}",
            digest
        )));
    }
    Ok(digest)
}

/// Hash `content` and compare with `expected`; returns the verified digest
pub fn verify_checksum(content: &[u8], expected: &str) -> Result<String, PricingError> {
    let actual = calculate_hash(content);
    if !actual.eq_ignore_ascii_case(expected) {
        return Err(PricingError::IntegrityMismatch {
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(actual)
}

/// Download a document from remote URL
pub async fn download_from_url(
    client: &reqwest::Client,
    url: &str,
) -> Result<Vec<u8>, PricingError> {
    debug!("Downloading {}", url);

    let response = client.get(url).send().await?;

    let status = response.status();
    if !status.is_success() {
        return Err(PricingError::SourceUnavailable {
            url: url.to_string(),
            message: format!("HTTP {}", status),
            status: Some(status.as_u16()),
        });
    }

    let content = response.bytes().await?;

    debug!("Downloaded {} bytes from {}", content.len(), url);
    Ok(content.to_vec())
}

/// Persist a verified document and its digest
///
/// Each file is written to a temporary sibling and renamed into place.
pub async fn save_cache(
    content: &[u8],
    hash: &str,
    pricing_path: &Path,
    hash_path: &Path,
) -> Result<(), PricingError> {
    if let Some(parent) = pricing_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    if let Some(parent) = hash_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    write_atomic(pricing_path, content).await?;
    write_atomic(hash_path, format!("{}\n", hash).as_bytes()).await?;

    info!("Saved pricing cache to: {}", pricing_path.display());
    Ok(())
}

async fn write_atomic(path: &Path, content: &[u8]) -> Result<(), PricingError> {
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = std::path::PathBuf::from(tmp_name);

    tokio::fs::write(&tmp_path, content).await?;
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}

/// Read a cached document and check it against its sidecar digest
///
/// Returns `Ok(None)` when no cache exists. A missing or empty sidecar is
/// tolerated; a sidecar that disagrees with the content is an integrity error.
pub async fn load_cache(
    pricing_path: &Path,
    hash_path: &Path,
) -> Result<Option<(Vec<u8>, String)>, PricingError> {
    let content = match tokio::fs::read(pricing_path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let stored = match tokio::fs::read_to_string(hash_path).await {
        Ok(text) if !text.trim().is_empty() => Some(parse_checksum(&text)?),
        Ok(_) => None,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => return Err(e.into()),
    };

    let hash = match stored {
        Some(expected) => verify_checksum(&content, &expected)?,
        None => {
            warn!(
                "No checksum stored next to {}, trusting local copy",
                pricing_path.display()
            );
            calculate_hash(&content)
        }
    };

    Ok(Some((content, hash)))
}

/// Format a cost for display (the calculator itself never rounds)
pub fn format_cost(cost: f64) -> String {
    if cost == 0.0 {
        "$0.000000".to_string()
    } else if cost < 0.000001 {
        format!("${:.2e}", cost)
    } else if cost < 0.01 {
        format!("${:.6}", cost)
    } else if cost < 1.0 {
        format!("${:.4}", cost)
    } else {
        format!("${:.2}", cost)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"{
        "sample_spec": {
            "input_cost_per_token": 0.0,
            "output_cost_per_token": 0.0,
            "mode": "one of chat, embedding, completion"
        },
        "claude-sonnet-4-20250514": {
            "input_cost_per_token": 0.000003,
            "output_cost_per_token": 0.000015,
            "cache_creation_input_token_cost": 0.00000375,
            "cache_read_input_token_cost": 0.0000003,
            "input_cost_per_token_above_200k_tokens": 0.000006,
            "cache_creation_input_token_cost_above_1hr": 0.0000075,
            "litellm_provider": "anthropic",
            "mode": "chat"
        },
        "gpt-4o": {
            "input_cost_per_token": 0.0000025,
            "output_cost_per_token": 0.00001,
            "mode": "chat"
        },
        "broken-model": {
            "input_cost_per_token": "three dollars",
            "output_cost_per_token": 0.00001
        },
        "negative-model": {
            "input_cost_per_token": -0.1,
            "output_cost_per_token": 0.00001
        },
        "dall-e-3": {
            "output_cost_per_image": 0.04,
            "mode": "image_generation"
        },
        "not-an-object": 42
    }"#;

    #[test]
    fn test_parse_catalog_skips_bad_entries() {
        let parsed = parse_catalog(SAMPLE.as_bytes()).unwrap();

        assert_eq!(parsed.cards.len(), 2);
        assert_eq!(parsed.skipped, 3);
        assert_eq!(parsed.unpriced, 1);
        assert!(!parsed.cards.contains_key("sample_spec"));

        let sonnet = &parsed.cards["claude-sonnet-4-20250514"];
        assert_eq!(sonnet.input_cost, 0.000003);
        assert_eq!(sonnet.input_cost_above_200k, Some(0.000006));
        assert_eq!(sonnet.output_cost_above_200k, None);
        assert_eq!(sonnet.cache_create_cost_above_1hr, Some(0.0000075));

        let gpt = &parsed.cards["gpt-4o"];
        assert_eq!(gpt.cache_create_cost, 0.0);
        assert_eq!(gpt.cache_read_cost, 0.0);
    }

    #[test]
    fn test_parse_catalog_rejects_non_object() {
        assert!(matches!(
            parse_catalog(b"[1, 2, 3]"),
            Err(PricingError::MalformedCatalog(_))
        ));
        assert!(matches!(
            parse_catalog(b"{\"sample_spec\": {}}"),
            Err(PricingError::MalformedCatalog(_))
        ));
    }

    #[test]
    fn test_calculate_hash() {
        assert_eq!(
            calculate_hash(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_parse_checksum_formats() {
        let digest = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";
        assert_eq!(parse_checksum(digest).unwrap(), digest);
        assert_eq!(parse_checksum(&format!("{}\n", digest)).unwrap(), digest);
        assert_eq!(
            parse_checksum(&format!("{}  model_prices.json\n", digest.to_uppercase())).unwrap(),
            digest
        );
        assert!(parse_checksum("").is_err());
        assert!(parse_checksum("deadbeef").is_err());
    }

    #[test]
    fn test_verify_checksum() {
        let good = calculate_hash(b"abc");
        assert_eq!(verify_checksum(b"abc", &good).unwrap(), good);
        assert!(matches!(
            verify_checksum(b"abd", &good),
            Err(PricingError::IntegrityMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_save_and_load_cache() {
        let temp_dir = TempDir::new().unwrap();
        let pricing_path = temp_dir.path().join("nested").join("model_pricing.json");
        let hash_path = temp_dir.path().join("nested").join("model_pricing.sha256");

        assert!(load_cache(&pricing_path, &hash_path).await.unwrap().is_none());

        let hash = calculate_hash(SAMPLE.as_bytes());
        save_cache(SAMPLE.as_bytes(), &hash, &pricing_path, &hash_path)
            .await
            .unwrap();

        let (content, loaded_hash) = load_cache(&pricing_path, &hash_path)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(content, SAMPLE.as_bytes());
        assert_eq!(loaded_hash, hash);
        assert!(!temp_dir.path().join("nested").join("model_pricing.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_load_cache_detects_tampering() {
        let temp_dir = TempDir::new().unwrap();
        let pricing_path = temp_dir.path().join("model_pricing.json");
        let hash_path = temp_dir.path().join("model_pricing.sha256");

        let hash = calculate_hash(SAMPLE.as_bytes());
        save_cache(SAMPLE.as_bytes(), &hash, &pricing_path, &hash_path)
            .await
            .unwrap();
        tokio::fs::write(&pricing_path, b"{}").await.unwrap();

        assert!(matches!(
            load_cache(&pricing_path, &hash_path).await,
            Err(PricingError::IntegrityMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_load_cache_without_sidecar() {
        let temp_dir = TempDir::new().unwrap();
        let pricing_path = temp_dir.path().join("model_pricing.json");
        let hash_path = temp_dir.path().join("model_pricing.sha256");
        tokio::fs::write(&pricing_path, SAMPLE).await.unwrap();

        let (_, hash) = load_cache(&pricing_path, &hash_path).await.unwrap().unwrap();
        assert_eq!(hash, calculate_hash(SAMPLE.as_bytes()));
    }

    #[test]
    fn test_format_cost() {
        assert_eq!(format_cost(0.0), "$0.000000");
        assert_eq!(format_cost(0.0000005), "$5.00e-7");
        assert_eq!(format_cost(0.0012346), "$0.001235");
        assert_eq!(format_cost(0.5), "$0.5000");
        assert_eq!(format_cost(12.346), "$12.35");
    }
}
