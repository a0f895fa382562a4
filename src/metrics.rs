use metrics::{counter, describe_counter, describe_gauge, gauge};

/// Register metric descriptions with whatever recorder the host installed
/// (can be called multiple times safely)
pub fn init_metric_descriptions() {
    describe_counter!(
        "pricing_catalog_refresh_total",
        "Catalog refresh attempts by outcome"
    );
    describe_gauge!(
        "pricing_catalog_models",
        "Number of models in the published pricing catalog"
    );
    describe_counter!(
        "pricing_cost_calculations_total",
        "Cost calculations served by the pricing facade"
    );
}

/// Record the outcome of a refresh (`updated`, `unchanged`, `discarded` or an error kind)
pub fn record_refresh(outcome: &'static str) {
    counter!("pricing_catalog_refresh_total", "outcome" => outcome).increment(1);
}

pub fn set_catalog_models(count: usize) {
    gauge!("pricing_catalog_models").set(count as f64);
}

pub fn record_cost_calculation(priced: bool, long_context: bool) {
    counter!(
        "pricing_cost_calculations_total",
        "priced" => bool_label(priced),
        "long_context" => bool_label(long_context),
    )
    .increment(1);
}

fn bool_label(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_metrics() {
        init_metric_descriptions();

        record_refresh("updated");
        record_refresh("integrity_mismatch");
        set_catalog_models(42);
        record_cost_calculation(true, false);
        record_cost_calculation(false, false);

        // No recorder is installed; these must simply not panic
    }

    #[test]
    fn test_bool_label() {
        assert_eq!(bool_label(true), "true");
        assert_eq!(bool_label(false), "false");
    }
}
