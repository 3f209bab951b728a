pub mod api;
pub mod bootstrap;
pub mod config;
pub mod ingest;
pub mod metrics_consts;
pub mod normalize;
pub mod readiness;
pub mod resolver;
pub mod schema;
pub mod service;
pub mod source;
pub mod stats;
pub mod store;
pub mod types;
