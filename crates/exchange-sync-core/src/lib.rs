//! Exchange Synchronization Core.
//!
//! Drives a single edge node's side of the Exchange protocol: heartbeat
//! liveness, the change-feed cursor and dispatch state machine, the
//! adaptive poll scheduler, and the version-range resolver used to
//! materialize workload/microservice definitions.
//!
//! The [`worker`] module is the composition root; everything else is a
//! narrow, independently testable piece it wires together.

pub mod bus;
pub mod client;
pub mod config;
pub mod definitions;
pub mod error;
pub mod eventlog;
pub mod metrics;
pub mod model;
pub mod poll;
pub mod store;
pub mod version;
pub mod worker;

pub use bus::{AgentEvent, ExchangeEvent, ShutdownReason};
pub use client::{ExchangeApi, ExchangeClient, RetryPolicy};
pub use config::ExchangeConfig;
pub use definitions::DefinitionLookup;
pub use error::{ExchangeError, Result};
pub use store::{CursorStore, SledCursorStore};
pub use worker::{ChangeWorker, WorkerCommand, WorkerHandle};
