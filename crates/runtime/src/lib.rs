//! Daemon core for pw-bridge.
//!
//! The daemon owns every browser resource behind opaque ids and serves
//! newline-delimited JSON commands over a Unix socket:
//!
//! * [`registry`] maps session and page ids to engine handles.
//! * [`dispatcher`] routes one command to one handler.
//! * [`jobs`] and [`runner`] track and execute asynchronous agent jobs.
//! * [`server`] and [`client`] are the two ends of the socket transport.
//! * [`engine`] is the automation boundary, with a Chromium/CDP
//!   implementation and an in-memory fake.

pub mod activity;
pub mod agent;
pub mod client;
pub mod config;
pub mod daemon;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod ids;
pub mod jobs;
pub mod process;
pub mod registry;
pub mod runner;
pub mod server;

pub use client::DaemonClient;
pub use config::DaemonConfig;
pub use daemon::Daemon;
pub use error::{BridgeError, ResourceKind, Result};
