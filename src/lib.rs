//! Hardware and cloud-GPU-rental price oracle.
//!
//! Fetches listings for a fixed catalog of hardware assets and rental GPU
//! types from several heterogeneous sources, fuses the observations into a
//! canonical price, maintains a time-weighted average, and exposes the
//! result over HTTP in both a convenience JSON shape and an oracle-adapter
//! request/response envelope.

pub mod adapters;
pub mod aggregator;
pub mod api;
pub mod catalog;
pub mod config;
pub mod error;
pub mod fetch;
pub mod filter;
pub mod history;
pub mod models;
pub mod scheduler;
pub mod strategies;
pub mod twap;

pub use aggregator::Aggregator;
pub use config::Config;
pub use error::{AdapterError, AdapterErrorCode, OracleError};
