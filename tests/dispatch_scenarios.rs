use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use netfan::config::DispatchConfig;
use netfan::device::{Credentials, DeviceDescriptor, Payload, TransportOptions, load_host_list};
use netfan::dispatch::Dispatcher;
use netfan::error::{ConnectError, DispatchError};
use netfan::executor::CancelSignal;
use netfan::session::{
    ConnectBehavior, DeviceSession, HostScript, ScriptedConnector, SessionConnector, StepResult,
};
use netfan::task::{OutcomeDetail, OutcomeStatus};
use netfan::templates::{DeviceFamily, Dialect, DialectRegistry};
use tokio::sync::Notify;

const LAB_SCRIPTS: &str = include_str!("fixtures/lab_scripts.json");

fn fixture(name: &str) -> String {
    format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name)
}

fn fleet<I, S>(hosts: I, family: DeviceFamily) -> Vec<DeviceDescriptor>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    DeviceDescriptor::fleet(
        hosts,
        &Credentials::password("netops", "s3cr3t-pass"),
        family,
        &TransportOptions::default(),
    )
}

fn scripted(connector: ScriptedConnector, config: DispatchConfig) -> (Arc<ScriptedConnector>, Dispatcher<ScriptedConnector>) {
    let connector = Arc::new(connector);
    let dispatcher =
        Dispatcher::with_shared_connector(Arc::clone(&connector), DialectRegistry::builtin(), config);
    (connector, dispatcher)
}

#[tokio::test]
async fn show_version_across_three_devices_with_one_timeout() {
    let connector = ScriptedConnector::from_json(LAB_SCRIPTS).expect("load scripts");
    let (_, dispatcher) = scripted(connector, DispatchConfig::default());
    let devices = fleet(["10.0.0.1", "10.0.0.2", "10.0.0.3"], DeviceFamily::Ios);

    let report = dispatcher
        .run(devices, Payload::command("show version").expect("command"), CancelSignal::new())
        .await
        .expect("run");

    assert_eq!(report.outcomes.len(), 3);
    assert_eq!(report.outcomes[0].status, OutcomeStatus::Success);
    assert!(
        report.outcomes[0]
            .output()
            .expect("device 1 output")
            .contains("Version 17.09.04a")
    );
    assert_eq!(report.outcomes[1].status, OutcomeStatus::ConnectFailure);
    assert_eq!(report.outcomes[2].status, OutcomeStatus::Success);
    assert!(
        report.outcomes[2]
            .output()
            .expect("device 3 output")
            .contains("Version 17.06.05")
    );

    assert_eq!(report.summary.total, 3);
    assert_eq!(report.summary.count(OutcomeStatus::Success), 2);
    assert_eq!(report.summary.count(OutcomeStatus::ConnectFailure), 1);
    assert_eq!(report.summary.counts.len(), 2);

    let text = report.to_string();
    assert!(text.contains(">>>> device: core1# - show version"));
    assert!(text.contains(">>>> device: 10.0.0.2 - show version\n"));
    assert!(text.contains("Time taken: "));
    assert!(!text.contains("s3cr3t-pass"));
    assert!(!report.to_json().expect("json").contains("s3cr3t-pass"));
}

#[tokio::test]
async fn config_file_stops_at_rejected_statement() {
    let payload = Payload::config_from_file(fixture("changes.cfg")).expect("load changes");
    let connector = ScriptedConnector::new().with_fallback(
        HostScript::accepting("sw1(config-if)#")
            .reject(" switchport mode trunk", "% Invalid input detected at '^' marker."),
    );
    let (connector, dispatcher) = scripted(connector, DispatchConfig::default());

    let report = dispatcher
        .run(fleet(["sw1"], DeviceFamily::Ios), payload, CancelSignal::new())
        .await
        .expect("run");

    let outcome = &report.outcomes[0];
    assert_eq!(outcome.status, OutcomeStatus::PartialFailure);
    assert_eq!(
        outcome.steps(),
        &[
            StepResult::ok("interface GigabitEthernet0/1", ""),
            StepResult::failed(
                " switchport mode trunk",
                "% Invalid input detected at '^' marker."
            ),
        ]
    );
    assert!(outcome.persist.is_none());
    assert_eq!(
        connector.sent_to("sw1"),
        vec!["interface GigabitEthernet0/1", " switchport mode trunk"]
    );
    assert_eq!(connector.sessions_closed(), 1);
}

#[tokio::test]
async fn verified_junos_config_is_committed() {
    let connector = ScriptedConnector::new().with_fallback(
        HostScript::accepting("netops@mx1#").reply("commit", "commit complete"),
    );
    let config = DispatchConfig {
        append_noop_terminator: true,
        ..DispatchConfig::default()
    };
    let (connector, dispatcher) = scripted(connector, config);
    let payload = Payload::config(["set system host-name mx1", "set system domain-name lab"])
        .expect("config");

    let report = dispatcher
        .run(fleet(["mx1"], DeviceFamily::Junos), payload, CancelSignal::new())
        .await
        .expect("run");

    let outcome = &report.outcomes[0];
    assert_eq!(outcome.status, OutcomeStatus::Success);
    assert_eq!(outcome.steps().len(), 2);
    assert_eq!(
        outcome.persist.as_ref().map(|step| step.output.as_str()),
        Some("commit complete")
    );
    assert_eq!(
        connector.sent_to("mx1"),
        vec!["set system host-name mx1", "set system domain-name lab", "commit"]
    );
    assert!(report.to_string().contains("Saving configuration ...\ncommit complete"));
}

#[tokio::test]
async fn silent_device_reports_empty_response() {
    let connector = ScriptedConnector::new().with_fallback(HostScript::accepting("leaf1#"));
    let (_, dispatcher) = scripted(connector, DispatchConfig::default());

    let report = dispatcher
        .run(
            fleet(["leaf1"], DeviceFamily::Eos),
            Payload::command("show logging last 1 minutes").expect("command"),
            CancelSignal::new(),
        )
        .await
        .expect("run");

    assert_eq!(report.outcomes[0].status, OutcomeStatus::Success);
    assert_eq!(report.outcomes[0].output(), Some("empty response"));
}

#[tokio::test]
async fn failures_are_classified_per_device() {
    let connector = ScriptedConnector::new()
        .with_fallback(HostScript::accepting("ok#").reply("show clock", "*10:00:00.000 UTC"))
        .with_host("refused", HostScript::default().with_connect(ConnectBehavior::Refuse))
        .with_host("badpass", HostScript::default().with_connect(ConnectBehavior::RejectAuth));
    let (connector, dispatcher) = scripted(connector, DispatchConfig::default());

    let report = dispatcher
        .run(
            fleet(["refused", "good", "badpass"], DeviceFamily::Nxos),
            Payload::command("show clock").expect("command"),
            CancelSignal::new(),
        )
        .await
        .expect("run");

    let statuses: Vec<OutcomeStatus> = report.outcomes.iter().map(|o| o.status).collect();
    assert_eq!(
        statuses,
        vec![
            OutcomeStatus::ConnectFailure,
            OutcomeStatus::Success,
            OutcomeStatus::AuthFailure
        ]
    );
    assert_eq!(connector.connect_attempts(), 3);
    assert_eq!(connector.sessions_opened(), 1);
    let rendered = format!("{report:?}\n{report}\n{}", report.to_json().expect("json"));
    assert!(!rendered.contains("s3cr3t-pass"));
    assert!(!rendered.contains("netops"));
}

#[tokio::test(start_paused = true)]
async fn hanging_device_only_holds_its_own_slot() {
    let connector = ScriptedConnector::new()
        .with_fallback(HostScript::accepting("r#").reply("show version", "ok"))
        .with_host("stuck", HostScript::default().with_connect(ConnectBehavior::Hang));
    let config = DispatchConfig {
        concurrency: 2,
        ..DispatchConfig::default()
    };
    let (_, dispatcher) = scripted(connector, config);

    let report = dispatcher
        .run(
            fleet(["stuck", "a", "b", "c"], DeviceFamily::Ios),
            Payload::command("show version").expect("command"),
            CancelSignal::new(),
        )
        .await
        .expect("run");

    assert_eq!(report.outcomes[0].status, OutcomeStatus::ConnectFailure);
    assert!(report.outcomes[1..].iter().all(|o| o.status == OutcomeStatus::Success));
}

#[tokio::test]
async fn duplicate_hosts_each_get_an_outcome() {
    let hosts = load_host_list(fixture("hosts.txt")).expect("load hosts");
    assert_eq!(hosts, vec!["10.0.0.1", "10.0.0.2", "10.0.0.3", "10.0.0.1"]);

    let connector = ScriptedConnector::new()
        .with_fallback(HostScript::accepting("r#").reply("show ip route summary", "3 routes"));
    let (connector, dispatcher) = scripted(connector, DispatchConfig::default());

    let report = dispatcher
        .run(
            fleet(hosts, DeviceFamily::Iosxr),
            Payload::command("show ip route summary").expect("command"),
            CancelSignal::new(),
        )
        .await
        .expect("run");

    assert_eq!(report.outcomes.len(), 4);
    assert_eq!(report.for_host("10.0.0.1").count(), 2);
    assert_eq!(connector.sent_to("10.0.0.1").len(), 2);
    assert_eq!(report.summary.count(OutcomeStatus::Success), 4);
}

#[tokio::test]
async fn preconditions_fail_before_any_connection() {
    let (connector, dispatcher) = scripted(ScriptedConnector::new(), DispatchConfig::default());

    let err = dispatcher
        .run(
            Vec::new(),
            Payload::command("show version").expect("command"),
            CancelSignal::new(),
        )
        .await
        .expect_err("no devices");
    assert!(matches!(err, DispatchError::NoDevices));

    let err = Payload::config_from_file(fixture("missing.cfg")).expect_err("missing file");
    assert!(matches!(err, DispatchError::ConfigFileNotFound(_)));

    let err = "vyos".parse::<DeviceFamily>().expect_err("unknown family");
    assert!(matches!(err, DispatchError::UnknownDeviceFamily(_)));

    assert_eq!(connector.connect_attempts(), 0);
}

#[tokio::test]
async fn summary_is_stable_across_calls() {
    let connector = ScriptedConnector::from_json(LAB_SCRIPTS).expect("load scripts");
    let (_, dispatcher) = scripted(connector, DispatchConfig::default());

    let report = dispatcher
        .run(
            fleet(["10.0.0.1", "10.0.0.3"], DeviceFamily::Ios),
            Payload::command("show version").expect("command"),
            CancelSignal::new(),
        )
        .await
        .expect("run");

    let again = report.summary.clone();
    assert_eq!(report.summary, again);
    assert!(report.summary.all_succeeded());
}

/// Counts sessions that are open at the same time.
#[derive(Default)]
struct TrackingConnector {
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

struct TrackingSession {
    active: Arc<AtomicUsize>,
}

impl SessionConnector for TrackingConnector {
    type Session = TrackingSession;

    async fn connect(
        &self,
        _device: &DeviceDescriptor,
        _dialect: &Dialect,
    ) -> Result<TrackingSession, ConnectError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        Ok(TrackingSession {
            active: Arc::clone(&self.active),
        })
    }
}

impl DeviceSession for TrackingSession {
    fn prompt(&self) -> Option<&str> {
        None
    }

    async fn send_command(&mut self, command: &str) -> Result<StepResult, ConnectError> {
        tokio::time::sleep(Duration::from_millis(10)).await;
        Ok(StepResult::ok(command, "done"))
    }

    async fn send_config(&mut self, statement: &str) -> Result<StepResult, ConnectError> {
        Ok(StepResult::ok(statement, ""))
    }

    async fn close(self) -> Result<(), ConnectError> {
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn never_more_sessions_than_the_ceiling() {
    let connector = Arc::new(TrackingConnector::default());
    let config = DispatchConfig {
        concurrency: 3,
        ..DispatchConfig::default()
    };
    let dispatcher =
        Dispatcher::with_shared_connector(Arc::clone(&connector), DialectRegistry::builtin(), config);
    let hosts: Vec<String> = (1..=12).map(|i| format!("10.1.0.{i}")).collect();

    let report = dispatcher
        .run(
            fleet(hosts, DeviceFamily::Ios),
            Payload::command("show version").expect("command"),
            CancelSignal::new(),
        )
        .await
        .expect("run");

    assert_eq!(report.summary.count(OutcomeStatus::Success), 12);
    assert!(connector.peak.load(Ordering::SeqCst) <= 3);
    assert_eq!(connector.active.load(Ordering::SeqCst), 0);
}

/// `dev-0` finishes as soon as `dev-1` has connected; `dev-1` then blocks on
/// `gate` until the test releases it.
#[derive(Default)]
struct GatedConnector {
    attempts: AtomicUsize,
    second_connected: Notify,
    gate: Arc<Notify>,
}

struct GatedSession {
    host: String,
    gate: Arc<Notify>,
}

impl SessionConnector for GatedConnector {
    type Session = GatedSession;

    async fn connect(
        &self,
        device: &DeviceDescriptor,
        _dialect: &Dialect,
    ) -> Result<GatedSession, ConnectError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        match device.host.as_str() {
            "dev-0" => self.second_connected.notified().await,
            "dev-1" => self.second_connected.notify_one(),
            _ => {}
        }
        Ok(GatedSession {
            host: device.host.clone(),
            gate: Arc::clone(&self.gate),
        })
    }
}

impl DeviceSession for GatedSession {
    fn prompt(&self) -> Option<&str> {
        None
    }

    async fn send_command(&mut self, command: &str) -> Result<StepResult, ConnectError> {
        if self.host == "dev-1" {
            self.gate.notified().await;
        }
        Ok(StepResult::ok(command, format!("{} answered", self.host)))
    }

    async fn send_config(&mut self, statement: &str) -> Result<StepResult, ConnectError> {
        Ok(StepResult::ok(statement, ""))
    }

    async fn close(self) -> Result<(), ConnectError> {
        Ok(())
    }
}

#[tokio::test]
async fn cancel_after_first_completion_drains_in_flight_and_skips_queue() {
    let connector = Arc::new(GatedConnector::default());
    let cancel = CancelSignal::new();
    let config = DispatchConfig {
        concurrency: 2,
        ..DispatchConfig::default()
    };
    let dispatcher =
        Dispatcher::with_shared_connector(Arc::clone(&connector), DialectRegistry::builtin(), config)
            .with_progress({
                let cancel = cancel.clone();
                let gate = Arc::clone(&connector.gate);
                move |progress| {
                    if progress.processed == 1 {
                        cancel.cancel();
                        // A second signal must be a no-op.
                        cancel.cancel();
                        gate.notify_one();
                    }
                }
            });
    let hosts: Vec<String> = (0..10).map(|i| format!("dev-{i}")).collect();

    let report = dispatcher
        .run(
            fleet(hosts, DeviceFamily::Ios),
            Payload::command("show version").expect("command"),
            cancel.clone(),
        )
        .await
        .expect("run");

    assert_eq!(report.outcomes.len(), 10);
    assert_eq!(report.outcomes[0].status, OutcomeStatus::Success);
    assert_eq!(report.outcomes[1].status, OutcomeStatus::Success);
    assert_eq!(report.outcomes[1].output(), Some("dev-1 answered"));
    for outcome in &report.outcomes[2..] {
        assert_eq!(outcome.status, OutcomeStatus::Cancelled);
        assert!(matches!(outcome.detail, OutcomeDetail::NotRun { .. }));
    }
    assert_eq!(report.summary.count(OutcomeStatus::Cancelled), 8);
    assert_eq!(connector.attempts.load(Ordering::SeqCst), 2);
    assert!(cancel.is_cancelled());
}
