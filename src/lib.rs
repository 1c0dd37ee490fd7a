pub mod config;
pub mod errors;
pub mod logging;
pub mod sku;
pub mod store;
