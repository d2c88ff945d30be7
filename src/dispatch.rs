//! Fleet dispatch entry point.
//!
//! [`Dispatcher::run`] checks every precondition before any device is contacted,
//! then hands one [`DeviceTask`] per device to the [`BoundedExecutor`] and folds
//! the outcome stream into a [`RunReport`].
//!
//! # Example
//!
//! ```rust,no_run
//! use netfan::config::DispatchConfig;
//! use netfan::device::{Credentials, DeviceDescriptor, Payload, TransportOptions};
//! use netfan::dispatch::Dispatcher;
//! use netfan::executor::CancelSignal;
//! use netfan::templates::DeviceFamily;
//!
//! # async fn run() -> Result<(), netfan::error::DispatchError> {
//! let config = DispatchConfig::default();
//! let devices = DeviceDescriptor::fleet(
//!     ["10.0.0.1", "10.0.0.2"],
//!     &Credentials::password("admin", "password"),
//!     DeviceFamily::Ios,
//!     &TransportOptions::from_config(&config),
//! );
//!
//! let cancel = CancelSignal::new();
//! let _ctrl_c = cancel.cancel_on_ctrl_c();
//! let report = Dispatcher::ssh(config)
//!     .run(devices, Payload::command("show version")?, cancel)
//!     .await?;
//! println!("{report}");
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use log::info;

use crate::config::DispatchConfig;
use crate::device::{DeviceDescriptor, Payload, TaskId};
use crate::error::DispatchError;
use crate::executor::{BoundedExecutor, CancelSignal, Progress, ProgressCallback};
use crate::report::{ResultAggregator, RunReport};
use crate::session::{SessionConnector, SshConnector};
use crate::task::{DeviceTask, OutcomeStatus};
use crate::templates::{DeviceFamily, Dialect, DialectRegistry};

/// Runs one payload across a fleet.
pub struct Dispatcher<C: SessionConnector> {
    connector: Arc<C>,
    registry: DialectRegistry,
    config: DispatchConfig,
    progress: Option<ProgressCallback>,
}

impl Dispatcher<SshConnector> {
    /// SSH dispatcher with the built-in dialects.
    pub fn ssh(config: DispatchConfig) -> Self {
        Self::new(SshConnector::new(), DialectRegistry::builtin(), config)
    }
}

impl<C: SessionConnector> Dispatcher<C> {
    pub fn new(connector: C, registry: DialectRegistry, config: DispatchConfig) -> Self {
        Self::with_shared_connector(Arc::new(connector), registry, config)
    }

    /// Uses a connector the caller keeps a handle to.
    pub fn with_shared_connector(
        connector: Arc<C>,
        registry: DialectRegistry,
        config: DispatchConfig,
    ) -> Self {
        Self {
            connector,
            registry,
            config,
            progress: None,
        }
    }

    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(Progress) + Send + Sync + 'static,
    {
        self.progress = Some(Arc::new(callback));
        self
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn registry(&self) -> &DialectRegistry {
        &self.registry
    }

    /// Builds the task list. Fails without side effects when a precondition is not met.
    pub fn prepare(
        &self,
        devices: Vec<DeviceDescriptor>,
        payload: &Payload,
    ) -> Result<Vec<DeviceTask>, DispatchError> {
        self.config.validate()?;
        if devices.is_empty() {
            return Err(DispatchError::NoDevices);
        }
        payload.validate()?;

        // One dialect and one payload per family; the no-op terminator is dialect specific.
        let mut per_family: HashMap<DeviceFamily, (Arc<Dialect>, Arc<Payload>)> = HashMap::new();
        for device in &devices {
            if let Entry::Vacant(slot) = per_family.entry(device.family) {
                let dialect = self.registry.require(device.family)?.clone();
                let payload = if self.config.append_noop_terminator {
                    payload.clone().with_noop_terminator(&dialect)
                } else {
                    payload.clone()
                };
                slot.insert((Arc::new(dialect), Arc::new(payload)));
            }
        }

        let mut tasks = Vec::with_capacity(devices.len());
        for (index, device) in devices.into_iter().enumerate() {
            let Some((dialect, payload)) = per_family.get(&device.family) else {
                return Err(DispatchError::DialectMissing(device.family.to_string()));
            };
            tasks.push(
                DeviceTask::new(
                    TaskId(index),
                    Arc::new(device),
                    Arc::clone(dialect),
                    Arc::clone(payload),
                )
                .with_persist(self.config.persist),
            );
        }
        Ok(tasks)
    }

    /// Dispatches `payload` to every device and waits for all outcomes.
    ///
    /// Returns an error only for precondition failures, in which case no device
    /// was contacted. Device failures are reported inside the [`RunReport`].
    pub async fn run(
        &self,
        devices: Vec<DeviceDescriptor>,
        payload: Payload,
        cancel: CancelSignal,
    ) -> Result<RunReport, DispatchError> {
        let tasks = self.prepare(devices, &payload)?;
        let total = tasks.len();

        info!(
            "Dispatching '{}' to {} devices, concurrency {}",
            payload.label(),
            total,
            self.config.concurrency
        );

        let executor = BoundedExecutor::new(Arc::clone(&self.connector), self.config.concurrency)
            .with_progress_callback(self.progress.clone());
        let mut aggregator = ResultAggregator::new(total);
        let mut stream = executor.submit(tasks, cancel);
        aggregator.collect(&mut stream).await;

        let report = aggregator.into_report(payload);
        info!(
            "Run finished: {}/{} succeeded, {} cancelled, time taken {} minutes",
            report.summary.count(OutcomeStatus::Success),
            report.summary.total,
            report.summary.count(OutcomeStatus::Cancelled),
            report.summary.time_taken()
        );
        Ok(report)
    }
}
