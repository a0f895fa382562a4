use crate::error::PricingError;
use crate::pricing::models::{
    canonical_model_id, is_long_context_model, AppliedPricing, CostBreakdown, RateCard,
    RateCatalog, UsageRecord, LONG_CONTEXT_THRESHOLD,
};

/// Calculate the cost of one request against a catalog snapshot
///
/// Pure: no I/O, no logging, no rounding. Unknown models are priced at zero
/// with `has_pricing = false`; only negative token counts are rejected.
pub fn calculate_cost(
    usage: &UsageRecord,
    model_id: &str,
    catalog: &RateCatalog,
) -> Result<CostBreakdown, PricingError> {
    usage.validate()?;

    let eligible = is_long_context_model(model_id);
    let card = match catalog.lookup(canonical_model_id(model_id)) {
        Some(card) => card,
        None => return Ok(CostBreakdown::zero()),
    };

    // Threshold uses the aggregate cache-creation count even when a breakdown is present
    let is_long_context_request = eligible && usage.prompt_total() > LONG_CONTEXT_THRESHOLD;
    let pricing = resolve_pricing(card, is_long_context_request);

    let mut breakdown = CostBreakdown {
        has_pricing: true,
        is_long_context_request,
        pricing,
        input_cost: token_cost(usage.input_tokens, pricing.input),
        output_cost: token_cost(usage.output_tokens, pricing.output),
        cache_create_cost: 0.0,
        cache_read_cost: token_cost(usage.cache_read_tokens, pricing.cache_read),
        ephemeral_5m_cost: None,
        ephemeral_1h_cost: None,
        total_cost: 0.0,
    };

    match &usage.cache_creation_breakdown {
        Some(buckets) => {
            let ephemeral_5m = token_cost(buckets.ephemeral_5m_tokens, pricing.cache_create);
            let ephemeral_1h = token_cost(buckets.ephemeral_1h_tokens, pricing.ephemeral_1h);
            breakdown.cache_create_cost = ephemeral_5m + ephemeral_1h;
            breakdown.ephemeral_5m_cost = Some(ephemeral_5m);
            breakdown.ephemeral_1h_cost = Some(ephemeral_1h);
        }
        None => {
            breakdown.cache_create_cost =
                token_cost(usage.cache_creation_tokens, pricing.cache_create);
        }
    }

    breakdown.calculate_total();

    Ok(breakdown)
}

/// Resolve the unit price of every category for one request
///
/// A tier price applies only when the request is long-context AND the card
/// carries that tier field; otherwise the base price is used.
pub fn resolve_pricing(card: &RateCard, is_long_context_request: bool) -> AppliedPricing {
    let tiered = |base: f64, above_200k: Option<f64>| match above_200k {
        Some(price) if is_long_context_request => price,
        _ => base,
    };

    let cache_create = tiered(card.cache_create_cost, card.cache_create_cost_above_200k);

    let ephemeral_1h = match (
        is_long_context_request,
        card.cache_create_cost_above_1hr_above_200k,
        card.cache_create_cost_above_1hr,
    ) {
        (true, Some(price), _) => price,
        (_, _, Some(price)) => price,
        _ => cache_create,
    };

    AppliedPricing {
        input: tiered(card.input_cost, card.input_cost_above_200k),
        output: tiered(card.output_cost, card.output_cost_above_200k),
        cache_create,
        cache_read: tiered(card.cache_read_cost, card.cache_read_cost_above_200k),
        ephemeral_1h,
    }
}

fn token_cost(tokens: i64, unit_price: f64) -> f64 {
    tokens as f64 * unit_price
}
