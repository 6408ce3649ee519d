// Domain layer: filter and row models, the query vocabulary, and the store ports.

pub mod model;
pub mod ports;
pub mod query;
