use super::*;

/// Opens interactive SSH shells on network devices.
#[derive(Debug, Clone)]
pub struct SshConnector {
    inactivity_timeout: Duration,
}

impl SshConnector {
    pub fn new() -> Self {
        Self {
            inactivity_timeout: Duration::from_secs(60),
        }
    }

    /// Idle time after which the SSH layer drops the connection.
    pub fn with_inactivity_timeout(mut self, timeout: Duration) -> Self {
        self.inactivity_timeout = timeout;
        self
    }
}

impl Default for SshConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionConnector for SshConnector {
    type Session = SshSession;

    async fn connect(
        &self,
        device: &DeviceDescriptor,
        dialect: &Dialect,
    ) -> Result<SshSession, ConnectError> {
        SshSession::open(device, dialect, self.inactivity_timeout).await
    }
}

/// A PTY shell on one device, driven line by line against the dialect prompt.
pub struct SshSession {
    client: Client,
    sender: Sender<String>,
    recv: Receiver<String>,
    matcher: PromptMatcher,
    prompt: String,
    in_config: bool,
    config_enter: String,
    config_exit: String,
    command_timeout: Duration,
    device_addr: String,
    _io_pump: IoPump,
}

impl SshSession {
    async fn open(
        device: &DeviceDescriptor,
        dialect: &Dialect,
        inactivity_timeout: Duration,
    ) -> Result<SshSession, ConnectError> {
        let device_addr = device.addr();
        let matcher = PromptMatcher::new(dialect)?;
        let security = &device.transport.security;

        let auth = match &device.credentials.secret {
            Secret::Password(password) => AuthMethod::with_password(password),
            Secret::KeyFile { path, passphrase } => {
                AuthMethod::with_key_file(path, passphrase.as_deref())
            }
        };

        let client = Client::connect_with_config(
            (device.host.clone(), device.transport.port),
            &device.credentials.username,
            auth,
            security.server_check.clone(),
            security.ssh_config(inactivity_timeout),
        )
        .await?;
        debug!(
            "{} authenticated (credentials {})",
            device_addr,
            device.credentials.fingerprint()
        );

        let mut channel = client.get_channel().await?;
        channel
            .request_pty(false, "xterm", 800, 600, 0, 0, &[])
            .await?;
        channel.request_shell(false).await?;
        debug!("{} Shell request successful", device_addr);

        let (sender_to_shell, mut receiver_from_user) = mpsc::channel::<String>(256);
        let (sender_to_user, receiver_from_shell) = mpsc::channel::<String>(256);

        let io_task_device_addr = device_addr.clone();
        let io_pump = IoPump(tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(data) = receiver_from_user.recv() => {
                        if let Err(e) = channel.data(data.as_bytes()).await {
                            debug!("{} Failed to send data to shell: {:?}", io_task_device_addr, e);
                            break;
                        }
                    },
                    Some(msg) = channel.wait() => {
                        match msg {
                            ChannelMsg::Data { ref data } => {
                                let text = String::from_utf8_lossy(data).into_owned();
                                if sender_to_user.send(text).await.is_err() {
                                    debug!("{} Shell output receiver dropped. Closing task.", io_task_device_addr);
                                    break;
                                }
                            }
                            ChannelMsg::ExitStatus { exit_status } => {
                                debug!("{} Shell exited with status code: {}", io_task_device_addr, exit_status);
                                let _ = channel.eof().await;
                                break;
                            }
                            ChannelMsg::Eof => {
                                debug!("{} Shell sent EOF.", io_task_device_addr);
                                break;
                            }
                            _ => {}
                        }
                    },
                    else => break,
                }
            }
            debug!("{} SSH I/O task ended.", io_task_device_addr);
        }));

        let mut session = SshSession {
            client,
            sender: sender_to_shell,
            recv: receiver_from_shell,
            matcher,
            prompt: String::new(),
            in_config: false,
            config_enter: dialect.config_enter.clone(),
            config_exit: dialect.config_exit.clone(),
            command_timeout: device.transport.command_timeout,
            device_addr,
            _io_pump: io_pump,
        };

        // Banner and MOTD end at the first prompt. Any early return from here on
        // drops the session, and with it the I/O pump.
        session.read_until_prompt().await?;
        debug!("{} initial prompt '{}'", session.device_addr, session.prompt);

        if let Some(paging) = dialect.disable_paging.as_deref() {
            let reply = session.exchange(paging).await?;
            if reply.failed {
                debug!(
                    "{} paging disable rejected: {}",
                    session.device_addr, reply.output
                );
            }
        }

        Ok(session)
    }

    /// Checks if the underlying SSH connection is still active.
    pub fn is_connected(&self) -> bool {
        !self.client.is_closed()
    }

    /// Collects complete lines until the buffered tail matches a prompt.
    ///
    /// Pagination markers are answered with a space and dialect confirmations with
    /// their configured answer. On timeout the partial output travels in the error.
    async fn read_until_prompt(&mut self) -> Result<Vec<String>, ConnectError> {
        let mut reader = ShellReader::new();
        let timeout = self.command_timeout;
        let SshSession {
            recv,
            sender,
            matcher,
            prompt,
            device_addr,
            ..
        } = self;

        let result: Result<Result<(), ConnectError>, _> = tokio::time::timeout(timeout, async {
            loop {
                let Some(data) = recv.recv().await else {
                    return Err(ConnectError::ChannelDisconnectError);
                };
                trace!("{} {:?}", device_addr, data);

                match reader.feed(matcher, &data) {
                    ReadAction::Continue => {}
                    ReadAction::Send(reply) => sender.send(reply).await?,
                    ReadAction::Prompt(found) => {
                        *prompt = found;
                        return Ok(());
                    }
                }
            }
        })
        .await;

        match result {
            Ok(Ok(())) => Ok(reader.into_lines()),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(ConnectError::ExecTimeout(reader.into_partial_output())),
        }
    }

    /// Sends one line and waits for the next prompt.
    async fn exchange(&mut self, input: &str) -> Result<StepResult, ConnectError> {
        if !self.is_connected() {
            return Err(ConnectError::ConnectClosedError);
        }

        // Drop anything left over from the previous exchange.
        while self.recv.try_recv().is_ok() {}

        self.sender.send(format!("{input}\n")).await?;
        let lines = self.read_until_prompt().await?;
        let step = step_result(&self.matcher, input, lines);
        debug!(
            "{} '{}' -> {} bytes{}",
            self.device_addr,
            input,
            step.output.len(),
            if step.failed { " (rejected)" } else { "" }
        );
        Ok(step)
    }
}

/// Step reported for a statement when the device refused to enter config mode.
fn config_entry_refused(statement: &str, reply: &StepResult) -> StepResult {
    StepResult::failed(
        statement,
        format!("could not enter configuration mode: {}", reply.output),
    )
}

/// Aborts the shell I/O pump when dropped, which releases the channel and with
/// it the SSH connection.
struct IoPump(JoinHandle<()>);

impl Drop for IoPump {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl DeviceSession for SshSession {
    fn prompt(&self) -> Option<&str> {
        if self.prompt.is_empty() {
            None
        } else {
            Some(&self.prompt)
        }
    }

    async fn send_command(&mut self, command: &str) -> Result<StepResult, ConnectError> {
        if self.in_config {
            let exit = self.config_exit.clone();
            self.exchange(&exit).await?;
            self.in_config = false;
        }
        self.exchange(command).await
    }

    async fn send_config(&mut self, statement: &str) -> Result<StepResult, ConnectError> {
        if !self.in_config {
            let enter = self.config_enter.clone();
            let reply = self.exchange(&enter).await?;
            if reply.failed {
                return Ok(config_entry_refused(statement, &reply));
            }
            self.in_config = true;
        }
        self.exchange(statement).await
    }

    async fn close(mut self) -> Result<(), ConnectError> {
        debug!("{} closing session", self.device_addr);

        if self.in_config && self.is_connected() {
            let exit = self.config_exit.clone();
            if let Err(e) = self.exchange(&exit).await {
                debug!("{} failed to leave config mode: {}", self.device_addr, e);
            }
        }

        self.recv.close();

        if self.is_connected() {
            if let Err(e) = self.sender.send("exit\n".to_string()).await {
                debug!("{} Failed to send exit command: {:?}", self.device_addr, e);
            }
            // Give the device a moment to process the exit before the client drops.
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        debug!("{} SSH session closed", self.device_addr);
        Ok(())
    }
}
