//! # Leslie's Pool
//!
//! Client for the water test results published in a Leslie's Pool account.
//! It logs into the storefront, keeps the session cookies across the
//! landing page and results requests, recovers once from an expired
//! session, and parses the newest row of the results table.
//!
//! ## Core Types
//!
//! - [`LesliesPoolApi`] - Session client with `authenticate` and `fetch_water_test_data`
//! - [`WaterTestReading`] - The ten chemistry values, test date and in-store flag
//! - [`FetchOutcome`] - Fresh, cached or empty result of a fetch
//! - [`Coordinator`] - Interval poller publishing [`CoordinatorState`]
//!
//! ## Authors
//!
//! - hua0512
//!

pub mod api;
pub mod cache;
pub mod config;
pub mod coordinator;
pub mod date;
pub mod error;
mod html;
pub mod http;
pub mod parser;
pub mod reading;
pub mod session;

pub use api::LesliesPoolApi;
pub use cache::LastKnownGood;
pub use config::{ClientOptions, Credentials, DEFAULT_BASE_URL};
pub use coordinator::{Coordinator, CoordinatorState, DEFAULT_SCAN_INTERVAL, SensorData};
pub use date::parse_test_date;
pub use error::{ClientError, ParseError};
pub use reading::{FetchOutcome, Measurement, WaterTestReading};
