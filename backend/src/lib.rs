pub mod analytics;
pub mod config;
pub mod db;
pub mod history;
pub mod market;
pub mod metrics;
pub mod scheduler;

pub mod error;
pub mod logger;
