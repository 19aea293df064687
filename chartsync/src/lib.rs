//! # ChartSync
//!
//! Client-side synchronization of chart data from a chart editing server.
//!
//! Layering, bottom to top:
//! - [`rpc`]: JSON-RPC 2.0 over HTTP POST
//! - [`repository`]: typed chart server calls
//! - [`service`]: cached score snapshot, attempt ordering and update events
//! - [`filters`]: per-period element filter pipeline

pub mod filters;
pub mod repository;
pub mod rpc;
pub mod service;

pub use filters::{ElementFilter, FilterManager, FilterRunSummary};
pub use repository::{ChartRepository, RpcChartRepository};
pub use rpc::RpcClient;
pub use service::{ChartDataService, ChartDataStatus};
