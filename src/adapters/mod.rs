// Adapters layer: concrete query stores behind the QueryStore port.

pub mod dataset;
pub mod http_store;
pub mod memory_store;

pub use dataset::Dataset;
pub use http_store::HttpSqlStore;
pub use memory_store::MemoryStore;
