//! # netfan - Network Device Fleet Dispatcher
//!
//! `netfan` runs one command, or one ordered batch of configuration statements,
//! against many network devices at once. Every device gets its own task that
//! connects, executes, verifies, optionally saves, and disconnects; a bounded
//! executor keeps at most N sessions open at any moment; and an aggregator turns
//! the per-device outcomes into a report with summary counts.
//!
//! ## Features
//!
//! - **Bounded Concurrency**: A semaphore-backed executor with a configurable ceiling (default 40)
//! - **Failure Isolation**: Connection, authentication, timeout and driver errors become per-device outcomes
//! - **Stop-on-Failure Config Runs**: Statements after the first rejected one are never sent
//! - **Graceful Cancellation**: Queued devices are skipped, in-flight sessions finish
//! - **Device Dialects**: ios, nxos, junos, iosxr and eos prompt/error patterns and save commands
//! - **Maximum Compatibility**: Secure, balanced and legacy SSH algorithm profiles
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use netfan::config::DispatchConfig;
//! use netfan::device::{Credentials, DeviceDescriptor, Payload, TransportOptions, load_host_list};
//! use netfan::dispatch::Dispatcher;
//! use netfan::executor::CancelSignal;
//! use netfan::templates::DeviceFamily;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DispatchConfig::default();
//!     let hosts = load_host_list("hosts.txt")?;
//!     let devices = DeviceDescriptor::fleet(
//!         hosts,
//!         &Credentials::password("admin", "password"),
//!         DeviceFamily::Nxos,
//!         &TransportOptions::from_config(&config),
//!     );
//!     let payload = Payload::config_from_file("changes.cfg")?;
//!
//!     let cancel = CancelSignal::new();
//!     let _ctrl_c = cancel.cancel_on_ctrl_c();
//!     let report = Dispatcher::ssh(config)
//!         .with_progress(|p| eprintln!("{}/{} {}", p.processed, p.total, p.status))
//!         .run(devices, payload, cancel)
//!         .await?;
//!
//!     println!("{report}");
//!     Ok(())
//! }
//! ```
//!
//! ## Main Components
//!
//! - [`dispatch::Dispatcher`] - Precondition checks, task construction, run orchestration
//! - [`task::DeviceTask`] - Per-device state machine producing one [`task::DeviceOutcome`]
//! - [`executor::BoundedExecutor`] - Concurrency ceiling, cancellation, progress
//! - [`report::ResultAggregator`] - Outcome collection and [`report::RunSummary`]
//! - [`session`] - Session seam plus the SSH and scripted implementations
//! - [`templates`] - Device-family dialect registry
//! - [`error::ConnectError`] / [`error::DispatchError`] - Session and pre-run errors
//! - [`config`] - Run configuration and SSH algorithm profiles

pub mod config;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod report;
pub mod session;
pub mod task;
pub mod templates;

pub use dispatch::Dispatcher;
pub use executor::CancelSignal;
pub use report::{RunReport, RunSummary};
pub use task::{DeviceOutcome, OutcomeStatus};
