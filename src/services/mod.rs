pub mod aggregator;
pub mod classifier;
pub mod episode_parser;
pub mod gateway;
pub mod m3u_parser;
pub mod metrics;
pub mod query_engine;
pub mod refresh;
