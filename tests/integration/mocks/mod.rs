pub mod mirror_mock;

pub use mirror_mock::{
    mount_catalog, mount_flaky_catalog, mount_unavailable, setup_mirror_mock, HASH_PATH,
    PRICING_PATH,
};
