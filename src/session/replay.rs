use super::*;

/// How a scripted device reacts to a connection attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConnectBehavior {
    #[default]
    Accept,
    /// Reports a connect timeout immediately.
    Timeout,
    Refuse,
    RejectAuth,
    /// Never answers; only the caller's connect timeout ends the attempt.
    Hang,
}

/// Scripted behavior of one device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct HostScript {
    pub connect: ConnectBehavior,
    /// Prompt reported after login.
    pub prompt: Option<String>,
    /// Output for specific inputs. Anything else answers with empty output.
    pub replies: HashMap<String, String>,
    /// Inputs the device rejects, mapped to the error text it prints.
    pub rejects: HashMap<String, String>,
    /// Inputs that never get an answer.
    pub stalls: Vec<String>,
    /// Delay applied to connect and to every exchange.
    pub delay_ms: u64,
}

impl HostScript {
    pub fn accepting(prompt: impl Into<String>) -> Self {
        Self {
            prompt: Some(prompt.into()),
            ..Default::default()
        }
    }

    pub fn with_connect(mut self, behavior: ConnectBehavior) -> Self {
        self.connect = behavior;
        self
    }

    pub fn reply(mut self, input: impl Into<String>, output: impl Into<String>) -> Self {
        self.replies.insert(input.into(), output.into());
        self
    }

    pub fn reject(mut self, input: impl Into<String>, error: impl Into<String>) -> Self {
        self.rejects.insert(input.into(), error.into());
        self
    }

    pub fn stall(mut self, input: impl Into<String>) -> Self {
        self.stalls.push(input.into());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay_ms = delay.as_millis() as u64;
        self
    }

    fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ScriptBook {
    fallback: HostScript,
    hosts: HashMap<String, HostScript>,
}

/// One line sent to a scripted device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentLine {
    pub host: String,
    pub input: String,
}

#[derive(Debug, Default)]
struct Ledger {
    sent: Mutex<Vec<SentLine>>,
    attempts: AtomicUsize,
    opened: AtomicUsize,
    closed: AtomicUsize,
}

impl Ledger {
    fn record(&self, host: &str, input: &str) {
        let mut sent = self.sent.lock().unwrap_or_else(|e| e.into_inner());
        sent.push(SentLine {
            host: host.to_string(),
            input: input.to_string(),
        });
    }
}

/// In-memory connector that replays per-host scripts.
///
/// Hosts without a script use the fallback script. Every line sent through a
/// session is recorded, so tests can assert on exactly what reached a device.
#[derive(Debug, Clone, Default)]
pub struct ScriptedConnector {
    hosts: HashMap<String, HostScript>,
    fallback: HostScript,
    ledger: Arc<Ledger>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, host: impl Into<String>, script: HostScript) -> Self {
        self.hosts.insert(host.into(), script);
        self
    }

    pub fn with_fallback(mut self, script: HostScript) -> Self {
        self.fallback = script;
        self
    }

    /// Loads scripts from JSON: `{"fallback": {...}, "hosts": {"10.0.0.1": {...}}}`.
    pub fn from_json(json: &str) -> Result<Self, DispatchError> {
        let book: ScriptBook = serde_json::from_str(json)?;
        Ok(Self {
            hosts: book.hosts,
            fallback: book.fallback,
            ledger: Arc::default(),
        })
    }

    fn script_for(&self, host: &str) -> &HostScript {
        self.hosts.get(host).unwrap_or(&self.fallback)
    }

    /// Lines sent to `host`, in order.
    pub fn sent_to(&self, host: &str) -> Vec<String> {
        let sent = self.ledger.sent.lock().unwrap_or_else(|e| e.into_inner());
        sent.iter()
            .filter(|line| line.host == host)
            .map(|line| line.input.clone())
            .collect()
    }

    /// Every line sent through any session.
    pub fn transcript(&self) -> Vec<SentLine> {
        self.ledger
            .sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Connection attempts, successful or not.
    pub fn connect_attempts(&self) -> usize {
        self.ledger.attempts.load(Ordering::SeqCst)
    }

    pub fn sessions_opened(&self) -> usize {
        self.ledger.opened.load(Ordering::SeqCst)
    }

    pub fn sessions_closed(&self) -> usize {
        self.ledger.closed.load(Ordering::SeqCst)
    }
}

impl SessionConnector for ScriptedConnector {
    type Session = ScriptedSession;

    async fn connect(
        &self,
        device: &DeviceDescriptor,
        _dialect: &Dialect,
    ) -> Result<ScriptedSession, ConnectError> {
        self.ledger.attempts.fetch_add(1, Ordering::SeqCst);
        let script = self.script_for(&device.host).clone();
        trace!("{} scripted connect: {:?}", device.addr(), script.connect);

        if !script.delay().is_zero() {
            tokio::time::sleep(script.delay()).await;
        }

        match script.connect {
            ConnectBehavior::Accept => {}
            ConnectBehavior::Timeout => {
                return Err(ConnectError::ConnectTimeout(
                    device.transport.connect_timeout.as_secs(),
                ));
            }
            ConnectBehavior::Refuse => {
                return Err(ConnectError::ConnectFailed(format!(
                    "{}:{} refused the connection",
                    device.host, device.transport.port
                )));
            }
            ConnectBehavior::RejectAuth => {
                return Err(ConnectError::AuthFailed(format!(
                    "{} denied the credentials",
                    device.addr()
                )));
            }
            ConnectBehavior::Hang => std::future::pending::<()>().await,
        }

        self.ledger.opened.fetch_add(1, Ordering::SeqCst);
        Ok(ScriptedSession {
            host: device.host.clone(),
            script,
            ledger: Arc::clone(&self.ledger),
        })
    }
}

/// Session handed out by [`ScriptedConnector`].
#[derive(Debug)]
pub struct ScriptedSession {
    host: String,
    script: HostScript,
    ledger: Arc<Ledger>,
}

impl ScriptedSession {
    async fn answer(&self, input: &str) -> Result<StepResult, ConnectError> {
        self.ledger.record(&self.host, input);

        if !self.script.delay().is_zero() {
            tokio::time::sleep(self.script.delay()).await;
        }
        if self.script.stalls.iter().any(|s| s == input) {
            std::future::pending::<()>().await;
        }
        if let Some(error) = self.script.rejects.get(input) {
            return Ok(StepResult::failed(input, error.clone()));
        }
        let output = self.script.replies.get(input).cloned().unwrap_or_default();
        Ok(StepResult::ok(input, output))
    }
}

impl DeviceSession for ScriptedSession {
    fn prompt(&self) -> Option<&str> {
        self.script.prompt.as_deref()
    }

    async fn send_command(&mut self, command: &str) -> Result<StepResult, ConnectError> {
        self.answer(command).await
    }

    async fn send_config(&mut self, statement: &str) -> Result<StepResult, ConnectError> {
        self.answer(statement).await
    }

    async fn close(self) -> Result<(), ConnectError> {
        self.ledger.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Credentials, TransportOptions};
    use crate::templates::{self, DeviceFamily};

    fn device(host: &str) -> DeviceDescriptor {
        DeviceDescriptor::new(
            host,
            Credentials::password("admin", "secret"),
            DeviceFamily::Ios,
            TransportOptions::default(),
        )
    }

    #[tokio::test]
    async fn scripted_session_replies_and_records() {
        let connector = ScriptedConnector::new().with_host(
            "r1",
            HostScript::accepting("r1#")
                .reply("show clock", "12:00:00 UTC")
                .reject("bogus", "% Invalid input detected"),
        );
        let dialect = templates::ios();

        let mut session = connector
            .connect(&device("r1"), &dialect)
            .await
            .expect("connect");
        assert_eq!(session.prompt(), Some("r1#"));

        let clock = session.send_command("show clock").await.expect("clock");
        assert_eq!(clock, StepResult::ok("show clock", "12:00:00 UTC"));
        let bogus = session.send_config("bogus").await.expect("bogus");
        assert!(bogus.failed);
        session.close().await.expect("close");

        assert_eq!(connector.sent_to("r1"), vec!["show clock", "bogus"]);
        assert_eq!(connector.sessions_opened(), 1);
        assert_eq!(connector.sessions_closed(), 1);
    }

    #[tokio::test]
    async fn connect_behaviors_map_to_errors() {
        let connector = ScriptedConnector::new()
            .with_host("t", HostScript::default().with_connect(ConnectBehavior::Timeout))
            .with_host("r", HostScript::default().with_connect(ConnectBehavior::Refuse))
            .with_host("a", HostScript::default().with_connect(ConnectBehavior::RejectAuth));
        let dialect = templates::ios();

        let err = connector.connect(&device("t"), &dialect).await.expect_err("timeout");
        assert!(matches!(err, ConnectError::ConnectTimeout(_)));
        let err = connector.connect(&device("r"), &dialect).await.expect_err("refused");
        assert!(matches!(err, ConnectError::ConnectFailed(_)));
        let err = connector.connect(&device("a"), &dialect).await.expect_err("auth");
        assert!(err.is_auth_failure());

        assert_eq!(connector.connect_attempts(), 3);
        assert_eq!(connector.sessions_opened(), 0);
    }

    #[test]
    fn scripts_load_from_json() {
        let connector = ScriptedConnector::from_json(
            r#"{
                "fallback": {"prompt": "sw#", "replies": {"show version": "EOS 4.30"}},
                "hosts": {"10.0.0.2": {"connect": "hang"}}
            }"#,
        )
        .expect("parse scripts");

        assert_eq!(connector.script_for("10.0.0.2").connect, ConnectBehavior::Hang);
        let fallback = connector.script_for("10.0.0.9");
        assert_eq!(fallback.prompt.as_deref(), Some("sw#"));
        assert_eq!(
            fallback.replies.get("show version").map(String::as_str),
            Some("EOS 4.30")
        );
    }
}
