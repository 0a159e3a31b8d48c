use futures_util::StreamExt;
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpSocket, lookup_host};
use tokio::sync::watch;
use tokio_util::codec::FramedRead;
use uuid::Uuid;

use super::error::{IrcError, Result as IrcResult};
use super::framer::LineFramer;
use super::irc_parser::*;
use super::router::{MessageRouter, RouteAction};
use super::state::{BoxedReader, ConnectionState};
use super::types::{ConnectionStatus, GameSink};
use crate::config::RelayConfig;

pub const DNS_TIMEOUT: Duration = Duration::from_secs(10);
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
pub const GREETING_TIMEOUT: Duration = Duration::from_secs(10);
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(60);
pub const SETTLE_DELAY: Duration = Duration::from_secs(1);
pub const AUTH_REPLY_TIMEOUT: Duration = Duration::from_secs(10);
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(10);
const USER_REALNAME: &str = "BZFlag ircRelay";

/// Read side of one live connection. Owned by the worker loop only.
pub struct InboundSession {
    id: Uuid,
    lines: FramedRead<BoxedReader, LineFramer>,
    router: MessageRouter,
    status_rx: watch::Receiver<ConnectionStatus>,
    config: Arc<RelayConfig>,
}

impl InboundSession {
    pub fn id(&self) -> Uuid {
        self.id
    }
}

/// Dial, handshake, authenticate, join, send and teardown for the single
/// IRC connection. Cheap to clone; every clone drives the same state.
#[derive(Clone)]
pub struct ConnectionManager {
    state: Arc<ConnectionState>,
    sink: Arc<dyn GameSink>,
}

impl ConnectionManager {
    pub fn new(state: Arc<ConnectionState>, sink: Arc<dyn GameSink>) -> Self {
        Self { state, sink }
    }

    pub fn state(&self) -> &Arc<ConnectionState> {
        &self.state
    }

    /// Resolves and dials the configured server. `stop` or `cleanup` abandon
    /// a dial that is still in flight.
    pub async fn connect(&self, config: Arc<RelayConfig>) -> IrcResult<InboundSession> {
        self.claim()?;

        let stream = match self.unless_stopped(self.dial(&config)).await {
            Ok(stream) => stream,
            Err(e) => {
                self.release_claim();
                return Err(e);
            }
        };

        self.install(stream, config).await
    }

    /// Takes over an already established stream as if `connect` had dialed it.
    pub async fn attach<S>(&self, stream: S, config: Arc<RelayConfig>) -> IrcResult<InboundSession>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        self.claim()?;
        self.install(stream, config).await
    }

    fn claim(&self) -> IrcResult<()> {
        if self
            .state
            .transition(ConnectionStatus::Disconnected, ConnectionStatus::Connecting)
        {
            return Ok(());
        }
        match self.state.status() {
            ConnectionStatus::Stopped => Err(IrcError::ShutdownRequested),
            _ => {
                tracing::debug!("Start skipped, a connection is already running");
                Err(IrcError::AlreadyConnected)
            }
        }
    }

    /// Runs `operation` until it finishes or the lifecycle leaves the
    /// connected states, whichever comes first.
    async fn unless_stopped<T>(&self, operation: impl Future<Output = IrcResult<T>>) -> IrcResult<T> {
        let mut status_rx = self.state.subscribe();
        tokio::select! {
            biased;
            status = status_rx.wait_for(|s| !s.has_handle()) => {
                tracing::debug!("Connection attempt abandoned");
                Err(stopped_error(status.map(|s| s.is_stopped()).unwrap_or(true)))
            }
            result = operation => result,
        }
    }

    fn release_claim(&self) {
        self.state
            .transition(ConnectionStatus::Connecting, ConnectionStatus::Disconnected);
    }

    async fn dial(&self, config: &RelayConfig) -> IrcResult<tokio::net::TcpStream> {
        let addr = resolve(config).await?;

        let socket = match addr {
            SocketAddr::V4(_) => TcpSocket::new_v4(),
            SocketAddr::V6(_) => TcpSocket::new_v6(),
        }
        .map_err(|e| {
            tracing::error!(
                irc.server = %config.server_label(),
                error = %e,
                "Connection to irc server failed, because creating the socket failed"
            );
            IrcError::SocketCreateFailed(e)
        })?;

        tracing::info!(irc.server = %config.server_label(), peer = %addr, "Connecting to irc server");

        match tokio::time::timeout(CONNECT_TIMEOUT, socket.connect(addr)).await {
            Ok(Ok(stream)) => {
                tune_socket(&stream);
                Ok(stream)
            }
            Ok(Err(tcp_error)) => {
                tracing::error!(
                    irc.server = %config.server_label(),
                    error = %tcp_error,
                    "TCP connection failed"
                );
                Err(IrcError::ConnectFailed {
                    address: config.server_label(),
                    reason: tcp_error.to_string(),
                })
            }
            Err(_) => {
                tracing::error!(
                    irc.server = %config.server_label(),
                    timeout = ?CONNECT_TIMEOUT,
                    "TCP connection timed out"
                );
                Err(IrcError::ConnectFailed {
                    address: config.server_label(),
                    reason: format!("timed out after {:?}", CONNECT_TIMEOUT),
                })
            }
        }
    }

    async fn install<S>(&self, stream: S, config: Arc<RelayConfig>) -> IrcResult<InboundSession>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        let id = Uuid::new_v4();

        {
            let mut slot = self.state.writer().await;
            if !self
                .state
                .transition(ConnectionStatus::Connecting, ConnectionStatus::Handshaking)
            {
                return Err(self.interrupted());
            }
            *slot = Some(Box::new(writer));
        }
        self.state.set_connection_id(Some(id));
        self.state.set_config(Some(Arc::clone(&config)));

        tracing::info!(
            connection.id = %id,
            irc.server = %config.server_label(),
            "TCP connected"
        );

        Ok(InboundSession {
            id,
            lines: FramedRead::new(Box::new(reader) as BoxedReader, LineFramer::new()),
            router: MessageRouter::new(Arc::clone(&config.ignored_nicks)),
            status_rx: self.state.subscribe(),
            config,
        })
    }

    /// Greeting, optional PASS, NICK and USER, then waits for the server's
    /// first PING (or RPL_WELCOME) before letting registration settle.
    pub async fn handshake(&self, session: &mut InboundSession) -> IrcResult<()> {
        let config = Arc::clone(&session.config);

        match tokio::time::timeout(GREETING_TIMEOUT, self.read_line(session)).await {
            Ok(line) => {
                let line = line?;
                tracing::trace!(connection.id = %session.id, line = %line, "Greeting");
                self.dispatch_line(session, &line).await?;
            }
            Err(_) => {
                tracing::debug!(
                    connection.id = %session.id,
                    timeout = ?GREETING_TIMEOUT,
                    "Server sent no greeting, registering anyway"
                );
            }
        }

        if let Some(pass) = &config.pass {
            self.send_secret(&format!("{} {}", CMD_PASS, pass), CMD_PASS)
                .await?;
        }
        self.send(&format!("{} {}", CMD_NICK, config.nick)).await?;
        self.send(&format!(
            "{} {} 0 * :{}",
            CMD_USER, config.nick, USER_REALNAME
        ))
        .await?;

        let registration = async {
            loop {
                let line = self.read_line(session).await?;
                let pinged = self.dispatch_line(session, &line).await?;
                if pinged || IrcMessage::parse(&line).command() == Some(RPL_WELCOME) {
                    return Ok::<(), IrcError>(());
                }
            }
        };
        tokio::time::timeout(HANDSHAKE_TIMEOUT, registration)
            .await
            .map_err(|_| IrcError::HandshakeTimeout(HANDSHAKE_TIMEOUT))??;

        tracing::debug!(connection.id = %session.id, "Registration acknowledged, settling");
        tokio::select! {
            biased;
            status = session.status_rx.wait_for(|s| !s.has_handle()) => {
                return Err(stopped_error(status.map(|s| s.is_stopped()).unwrap_or(true)));
            }
            _ = tokio::time::sleep(SETTLE_DELAY) => {}
        }

        self.advance(ConnectionStatus::Handshaking, ConnectionStatus::Authenticating)
    }

    /// Logs in with the configured service, if any.
    pub async fn authenticate(&self, session: &mut InboundSession) -> IrcResult<()> {
        let config = Arc::clone(&session.config);

        match (config.auth_type.service(), &config.auth_pass) {
            (None, _) => {}
            (Some((service, _)), None) => {
                tracing::warn!(
                    connection.id = %session.id,
                    service = %service,
                    "Authentication type set without a password, skipping"
                );
            }
            (Some((service, verb)), Some(auth_pass)) => {
                tracing::info!(connection.id = %session.id, service = %service, "Authenticating");
                self.send_secret(
                    &format!(
                        "{} {} :{} {} {}",
                        CMD_PRIVMSG, service, verb, config.nick, auth_pass
                    ),
                    &format!("{} {} :{}", CMD_PRIVMSG, service, verb),
                )
                .await?;
                self.await_auth_reply(session, service).await?;
            }
        }

        self.advance(ConnectionStatus::Authenticating, ConnectionStatus::Joining)
    }

    async fn await_auth_reply(&self, session: &mut InboundSession, service: &str) -> IrcResult<()> {
        let service_nick = service.split('@').next().unwrap_or(service);

        let reply = async {
            loop {
                let line = self.read_line(session).await?;
                self.dispatch_line(session, &line).await?;
                let message = IrcMessage::parse(&line);
                match message.command() {
                    Some(CMD_NOTICE)
                        if message
                            .prefix_name()
                            .is_some_and(|p| p.eq_ignore_ascii_case(service_nick)) =>
                    {
                        tracing::info!(
                            connection.id = %session.id,
                            service = %service_nick,
                            reply = %message.params().last().copied().unwrap_or_default(),
                            "Authentication reply"
                        );
                        return Ok::<(), IrcError>(());
                    }
                    Some(RPL_LOGGEDIN) => {
                        tracing::info!(connection.id = %session.id, "Logged in");
                        return Ok(());
                    }
                    Some(ERR_SASLFAIL) => {
                        tracing::warn!(connection.id = %session.id, "Authentication rejected");
                        return Ok(());
                    }
                    _ => {}
                }
            }
        };

        match tokio::time::timeout(AUTH_REPLY_TIMEOUT, reply).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    connection.id = %session.id,
                    service = %service_nick,
                    timeout = ?AUTH_REPLY_TIMEOUT,
                    "No reply from authentication service, joining anyway"
                );
                Ok(())
            }
        }
    }

    pub async fn join(&self, session: &mut InboundSession) -> IrcResult<()> {
        self.send(&format!("{} #{}", CMD_JOIN, session.config.channel))
            .await?;
        self.advance(ConnectionStatus::Joining, ConnectionStatus::Joined)?;
        tracing::info!(
            connection.id = %session.id,
            irc.channel = %session.config.channel,
            irc.nick = %session.config.nick,
            "Joined channel"
        );
        Ok(())
    }

    /// Relays inbound traffic until the link drops or is stopped.
    pub async fn listen(&self, session: &mut InboundSession) -> IrcResult<()> {
        loop {
            let line = self.read_line(session).await?;
            self.dispatch_line(session, &line).await?;
        }
    }

    /// Writes one protocol line. A failed write tears the connection down.
    pub async fn send(&self, line: &str) -> IrcResult<()> {
        tracing::debug!(line = %line, "Sending to irc server");
        self.write_line(line).await
    }

    async fn send_secret(&self, line: &str, redacted: &str) -> IrcResult<()> {
        tracing::debug!(line = %redacted, "Sending to irc server (credentials redacted)");
        self.write_line(line).await
    }

    async fn write_line(&self, line: &str) -> IrcResult<()> {
        let wire = format!("{}\r\n", line);

        let result = {
            let mut slot = self.state.writer().await;
            let Some(writer) = slot.as_mut() else {
                return Err(IrcError::NotConnected);
            };
            tokio::time::timeout(WRITE_TIMEOUT, async {
                writer.write_all(wire.as_bytes()).await?;
                writer.flush().await
            })
            .await
        };

        let reason = match result {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("write timed out after {:?}", WRITE_TIMEOUT),
        };
        tracing::warn!(error = %reason, "Connection lost to irc server");
        self.state.flag_failure();
        self.stop().await;
        Err(IrcError::ConnectionLost(reason))
    }

    /// Closes the handle. Repeated calls are no-ops.
    pub async fn stop(&self) {
        let was_up = self.state.mark_disconnected();
        let writer = self.state.writer().await.take();

        if let Some(mut writer) = writer {
            tracing::info!(
                connection.id = ?self.state.connection_id(),
                "Stopping irc server connection"
            );
            let _ = tokio::time::timeout(Duration::from_secs(1), writer.shutdown()).await;
        } else if !was_up {
            tracing::trace!("Stop requested, nothing to close");
        }
        self.state.set_connection_id(None);
    }

    /// Permanently stops the bridge. The worker observes this and exits.
    pub async fn cleanup(&self) {
        if self.state.mark_stopped() {
            tracing::info!("Cleaning up irc relay connection");
        }
        self.stop().await;
        self.state.set_config(None);
    }

    async fn read_line(&self, session: &mut InboundSession) -> IrcResult<String> {
        tokio::select! {
            biased;
            status = session.status_rx.wait_for(|s| !s.has_handle()) => {
                Err(stopped_error(status.map(|s| s.is_stopped()).unwrap_or(true)))
            }
            next = session.lines.next() => match next {
                None => {
                    tracing::info!(connection.id = %session.id, "Connection closed by irc server (EOF)");
                    Err(IrcError::ConnectionLost("closed by server".to_string()))
                }
                Some(Ok(line)) => {
                    tracing::trace!(connection.id = %session.id, line = %line, "Received from irc server");
                    Ok(line)
                }
                Some(Err(e)) => {
                    tracing::warn!(connection.id = %session.id, error = %e, "Error reading from irc server");
                    Err(IrcError::ConnectionLost(e.to_string()))
                }
            }
        }
    }

    /// Routes one line. Returns whether it was a PING that got answered.
    async fn dispatch_line(&self, session: &mut InboundSession, line: &str) -> IrcResult<bool> {
        let mut pinged = false;
        for action in session.router.route(line) {
            match action {
                RouteAction::Pong(reply) => {
                    tracing::trace!(connection.id = %session.id, reply = %reply, "Answering PING");
                    self.write_line(&reply).await?;
                    pinged = true;
                    if self.state.record_ping() {
                        tracing::debug!(
                            connection.id = %session.id,
                            "Connection healthy, backoff counters reset"
                        );
                    }
                }
                RouteAction::Forward(chat) => {
                    self.sink.deliver(chat.into_game_chat());
                }
                RouteAction::Ignored { .. } => {}
            }
        }
        Ok(pinged)
    }

    fn advance(&self, from: ConnectionStatus, to: ConnectionStatus) -> IrcResult<()> {
        if self.state.transition(from, to) {
            Ok(())
        } else {
            Err(self.interrupted())
        }
    }

    fn interrupted(&self) -> IrcError {
        stopped_error(self.state.status().is_stopped())
    }
}

fn tune_socket(stream: &tokio::net::TcpStream) {
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!(error = %e, "Could not disable Nagle's algorithm");
    }
}

fn stopped_error(shutdown: bool) -> IrcError {
    if shutdown {
        IrcError::ShutdownRequested
    } else {
        IrcError::NotConnected
    }
}

async fn resolve(config: &RelayConfig) -> IrcResult<SocketAddr> {
    if let Ok(ip) = config.address.parse::<IpAddr>() {
        tracing::debug!(irc.server = %config.address, "Given irc server address looks like an IP");
        return Ok(SocketAddr::new(ip, config.port));
    }

    tracing::debug!(irc.server = %config.address, "Given irc server address looks like a hostname");
    let dns_failure = |reason: String| {
        tracing::error!(irc.server = %config.address, error = %reason, "Could not resolve irc server");
        IrcError::DnsResolutionFailed {
            host: config.address.clone(),
            reason,
        }
    };

    let lookup = lookup_host((config.address.as_str(), config.port));
    let addrs: Vec<SocketAddr> = match tokio::time::timeout(DNS_TIMEOUT, lookup).await {
        Ok(Ok(addrs)) => addrs.collect(),
        Ok(Err(e)) => return Err(dns_failure(e.to_string())),
        Err(_) => return Err(dns_failure(format!("timed out after {:?}", DNS_TIMEOUT))),
    };

    addrs
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| dns_failure("no addresses returned".to_string()))
}
