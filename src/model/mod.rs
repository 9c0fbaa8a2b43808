pub mod knowledge;
pub mod sku;
pub mod snapshot;
