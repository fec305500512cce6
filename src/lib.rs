pub mod cache;
pub mod capture;
pub mod challenge;
pub mod client;
pub mod config;
pub mod db;
pub mod device;
pub mod error;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod radar;
pub mod report;
pub mod store;
pub mod summary;
pub mod trend;
