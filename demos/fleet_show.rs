use netfan::config::DispatchConfig;
use netfan::device::{Credentials, DeviceDescriptor, Payload, TransportOptions};
use netfan::dispatch::Dispatcher;
use netfan::executor::CancelSignal;
use netfan::report::RunReport;
use netfan::session::{ConnectBehavior, HostScript, ScriptedConnector};
use netfan::templates::{DeviceFamily, DialectRegistry};

const LAB_HOSTS: [&str; 3] = ["192.168.1.1", "192.168.1.2", "192.168.1.3"];

fn dry_run_connector() -> ScriptedConnector {
    ScriptedConnector::new()
        .with_fallback(
            HostScript::accepting("lab-sw#")
                .reply("show version", "Cisco IOS Software, Version 15.2(7)E8"),
        )
        .with_host(
            "192.168.1.2",
            HostScript::default().with_connect(ConnectBehavior::Timeout),
        )
}

fn print_report(report: &RunReport) {
    println!("{report}");
    if !report.summary.all_succeeded() {
        eprintln!(
            "{} of {} devices did not succeed",
            report.summary.total - report.summary.count(netfan::OutcomeStatus::Success),
            report.summary.total
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dry_run = std::env::args().any(|arg| arg == "--dry-run");

    let config = DispatchConfig {
        concurrency: 10,
        ..DispatchConfig::default()
    };
    let devices = DeviceDescriptor::fleet(
        LAB_HOSTS,
        &Credentials::password("admin", "password"),
        DeviceFamily::Ios,
        &TransportOptions::from_config(&config),
    );
    let payload = Payload::command("show version")?;

    let cancel = CancelSignal::new();
    let ctrl_c = cancel.cancel_on_ctrl_c();

    let report = if dry_run {
        Dispatcher::new(dry_run_connector(), DialectRegistry::builtin(), config)
            .run(devices, payload, cancel)
            .await?
    } else {
        Dispatcher::ssh(config)
            .with_progress(|p| eprintln!("[{}/{}] {} {}", p.processed, p.total, p.task_id, p.status))
            .run(devices, payload, cancel)
            .await?
    };
    ctrl_c.abort();

    print_report(&report);
    Ok(())
}
