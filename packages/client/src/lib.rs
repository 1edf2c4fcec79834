#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Client side of the run club map: cache-first loading of the published
//! collection, the filter engine, and the view controller tying them to
//! the spatial engine.

pub mod controller;
pub mod filter;
pub mod loader;

pub use controller::{LoadStatus, UserPreferences, ViewController};
pub use filter::FilterState;
pub use loader::{CacheStatus, DataLoader, FeatureFetcher, HttpFetcher, LoadError, LoaderConfig};
