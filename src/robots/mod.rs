//! Robots.txt handling module
//!
//! This module fetches, parses and caches robots.txt per host, and answers
//! fetch-allowed and crawl-delay queries for the rest of the harvester.

mod gate;
mod policy;

pub use gate::RobotsGate;
pub use policy::{product_token, RobotsPolicy, MAX_CRAWL_DELAY_SECS};
