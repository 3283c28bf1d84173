use super::packet::{
    self, FrameBuffer, ID_AUTH, SERVERDATA_AUTH, SERVERDATA_AUTH_RESPONSE, SERVERDATA_EXECCOMMAND,
};
use super::RconError;
use rand::Rng;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Connection parameters for an [`RconClient`]
#[derive(Debug, Clone)]
pub struct RconOptions {
    pub host: String,
    pub port: u16,
    pub max_packet_size: usize,
    pub connect_timeout: Duration,
}

impl Default for RconOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 27015,
            max_packet_size: packet::DEFAULT_MAX_PACKET_SIZE,
            connect_timeout: Duration::from_millis(1000),
        }
    }
}

/// Source RCON client over a single TCP session.
///
/// Methods take `&mut self`; callers share a client behind the command queue,
/// which guarantees a single command is in flight at a time.
///
/// An `execute` future dropped before it finished (the queue's timeout) can
/// leave a half-written request or unread output on the socket. The next
/// `execute` notices and reconnects with the stored password first.
#[derive(Debug)]
pub struct RconClient {
    options: RconOptions,
    stream: Option<TcpStream>,
    frames: FrameBuffer,
    authenticated: bool,
    password: Option<String>,
    /// Set while a command is on the wire, cleared once its output is complete
    in_flight: bool,
    last_id: i32,
}

impl RconClient {
    pub fn new(options: RconOptions) -> Self {
        let frames = FrameBuffer::new(options.max_packet_size);
        Self {
            options,
            stream: None,
            frames,
            authenticated: false,
            password: None,
            in_flight: false,
            last_id: 0,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Open the TCP session.
    pub async fn connect(&mut self) -> Result<(), RconError> {
        let addr = format!("{}:{}", self.options.host, self.options.port);
        tracing::debug!("Connecting to RCON at {}", addr);

        let stream = timeout(self.options.connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| RconError::ConnectionTimeout(self.options.connect_timeout))?
            .map_err(|e| RconError::Connection(format!("{}: {}", addr, e)))?;

        self.stream = Some(stream);
        self.frames = FrameBuffer::new(self.options.max_packet_size);
        Ok(())
    }

    /// Connect if needed and perform the password handshake.
    ///
    /// Packets other than `AUTH_RESPONSE` (servers send an empty response value
    /// first) are skipped. An `AUTH_RESPONSE` carrying any id but [`ID_AUTH`]
    /// means the password was rejected; the session is closed in that case.
    pub async fn authenticate(&mut self, password: &str) -> Result<(), RconError> {
        if self.authenticated {
            return Err(RconError::AlreadyAuthenticated);
        }
        if self.stream.is_none() {
            self.connect().await?;
        }

        self.send(SERVERDATA_AUTH, ID_AUTH, password).await?;

        loop {
            let packet = self.recv().await?;
            if packet.kind != SERVERDATA_AUTH_RESPONSE {
                continue;
            }

            if packet.id == ID_AUTH {
                self.authenticated = true;
                self.password = Some(password.to_string());
                tracing::info!("RCON authenticated");
                return Ok(());
            }

            tracing::warn!("RCON password rejected (id {})", packet.id);
            let _ = self.disconnect().await;
            return Err(RconError::Auth);
        }
    }

    /// Run a console command and return its accumulated output.
    ///
    /// Output may arrive in several packets. Bodies whose id matches the request
    /// are concatenated until the text contains the command itself: the server
    /// echoes `rcon from "...": command "<cmd>"` into its console log, which
    /// closes the response. A command whose echo never shows up waits until the
    /// caller's timeout.
    pub async fn execute(&mut self, command: &str) -> Result<String, RconError> {
        if self.in_flight {
            self.resync().await?;
        }
        if self.stream.is_none() {
            return Err(RconError::NotConnected);
        }
        if !self.authenticated {
            return Err(RconError::NotAuthorized);
        }

        // Leftovers of the previous command are skipped by id, so never reuse it
        let id = loop {
            let id: i32 = rand::rng().random_range(1..=255);
            if id != self.last_id {
                break id;
            }
        };
        self.last_id = id;

        self.in_flight = true;
        self.send(SERVERDATA_EXECCOMMAND, id, command).await?;

        let mut response = String::new();
        loop {
            let packet = self.recv().await?;
            if packet.id != id {
                tracing::trace!("Skipping RCON packet with stale id {}", packet.id);
                continue;
            }

            response.push_str(&packet.body);
            if response.contains(command) {
                self.in_flight = false;
                return Ok(response);
            }
        }
    }

    /// Replace a session left mid-command with a fresh, re-authenticated one.
    async fn resync(&mut self) -> Result<(), RconError> {
        tracing::warn!("RCON session interrupted mid-command, reconnecting");
        let password = self.password.clone().ok_or(RconError::NotAuthorized)?;

        let _ = self.disconnect().await;
        self.in_flight = false;
        self.connect().await?;
        self.authenticate(&password).await
    }

    /// Close the session and drop authentication.
    pub async fn disconnect(&mut self) -> Result<(), RconError> {
        self.authenticated = false;
        self.in_flight = false;
        match self.stream.take() {
            Some(mut stream) => stream.shutdown().await.map_err(RconError::Write),
            None => Ok(()),
        }
    }

    async fn send(&mut self, kind: i32, id: i32, body: &str) -> Result<(), RconError> {
        let bytes = packet::encode(kind, id, body, self.options.max_packet_size)?;
        let stream = self.stream.as_mut().ok_or(RconError::NotConnected)?;

        if let Err(e) = stream.write_all(&bytes).await {
            self.mark_closed();
            return Err(RconError::Write(e));
        }
        Ok(())
    }

    async fn recv(&mut self) -> Result<packet::Packet, RconError> {
        let stream = self.stream.as_mut().ok_or(RconError::NotConnected)?;

        match packet::read_packet(stream, &mut self.frames).await {
            Ok(Some(packet)) => Ok(packet),
            Ok(None) => {
                tracing::warn!("RCON connection closed by server");
                self.mark_closed();
                Err(RconError::Closed)
            }
            Err(e) => {
                self.mark_closed();
                Err(e.into())
            }
        }
    }

    fn mark_closed(&mut self) {
        self.stream = None;
        self.authenticated = false;
        self.in_flight = false;
    }
}
