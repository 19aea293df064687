//! # ChartSync Common Library
//!
//! Shared code for the chart synchronization client including:
//! - Wire data model for the chart server (staves, periods, elements)
//! - Error taxonomy shared by transport, repository and service layers
//! - Chart data update events and the subscriber notifier
//! - Configuration loading
//! - Recent project records store

pub mod config;
pub mod error;
pub mod events;
pub mod model;
pub mod projects;

pub use error::{Error, Result};
pub use events::{ChartDataUpdated, Subscription, UpdateNotifier};
pub use model::{Element, Period, ScoreInformation, Staff};
