pub const SONNET: &str = "claude-sonnet-4-20250514";
pub const HAIKU: &str = "claude-3-5-haiku-20241022";

/// Sonnet with every tier field, haiku with base prices only
pub const CATALOG_V1: &str = r#"{
    "sample_spec": {
        "max_tokens": "LEGACY parameter",
        "input_cost_per_token": 0.0,
        "output_cost_per_token": 0.0
    },
    "claude-sonnet-4-20250514": {
        "input_cost_per_token": 0.000003,
        "output_cost_per_token": 0.000015,
        "cache_creation_input_token_cost": 0.00000375,
        "cache_read_input_token_cost": 0.0000003,
        "input_cost_per_token_above_200k_tokens": 0.000006,
        "output_cost_per_token_above_200k_tokens": 0.0000225,
        "cache_creation_input_token_cost_above_200k_tokens": 0.0000075,
        "cache_read_input_token_cost_above_200k_tokens": 0.0000006,
        "cache_creation_input_token_cost_above_1hr": 0.000006,
        "cache_creation_input_token_cost_above_1hr_above_200k_tokens": 0.000012,
        "litellm_provider": "anthropic",
        "mode": "chat"
    },
    "claude-3-5-haiku-20241022": {
        "input_cost_per_token": 0.0000008,
        "output_cost_per_token": 0.000004,
        "cache_creation_input_token_cost": 0.000001,
        "cache_read_input_token_cost": 0.00000008,
        "litellm_provider": "anthropic",
        "mode": "chat"
    },
    "dall-e-3": {
        "output_cost_per_image": 0.04,
        "mode": "image_generation"
    },
    "broken-model": {
        "input_cost_per_token": "not a number"
    }
}"#;

/// Same models with a sonnet price change
pub const CATALOG_V2: &str = r#"{
    "claude-sonnet-4-20250514": {
        "input_cost_per_token": 0.0000035,
        "output_cost_per_token": 0.0000175,
        "cache_creation_input_token_cost": 0.00000375,
        "cache_read_input_token_cost": 0.0000003
    },
    "claude-3-5-haiku-20241022": {
        "input_cost_per_token": 0.0000008,
        "output_cost_per_token": 0.000004
    }
}"#;

/// Document with a single base-priced model
pub fn catalog_document(model: &str, input_cost: f64, output_cost: f64) -> String {
    let mut entry = serde_json::Map::new();
    entry.insert("input_cost_per_token".to_string(), input_cost.into());
    entry.insert("output_cost_per_token".to_string(), output_cost.into());

    let mut document = serde_json::Map::new();
    document.insert(model.to_string(), serde_json::Value::Object(entry));
    serde_json::Value::Object(document).to_string()
}
