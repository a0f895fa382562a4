pub mod calculator;
pub mod loader;
pub mod models;
pub mod service;
pub mod source;
pub mod updater;

pub use calculator::{calculate_cost, resolve_pricing};
pub use loader::{format_cost, parse_catalog, ParsedCatalog};
pub use models::{
    AppliedPricing, CacheCreationBreakdown, CatalogOrigin, CostBreakdown, RateCard, RateCatalog,
    UsageRecord,
};
pub use service::PricingService;
pub use source::{CatalogSource, FileCatalogSource, HttpCatalogSource};
pub use updater::{CatalogStatus, CatalogSynchronizer, RefreshOutcome, SyncState};
