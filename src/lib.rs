//! Ruuvi Station gateway API receiver.
//!
//! Accepts the gateway payloads posted by the Ruuvi Station mobile app,
//! flattens every sensor reading into one InfluxDB point per measured value
//! and writes them without holding up the response.

pub mod app;
pub mod config;
pub mod domain;
pub mod http;
pub mod influx;
pub mod ingest;
pub mod metrics;
pub mod sink;
