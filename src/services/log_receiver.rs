use std::io;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

const HEADER: [u8; 4] = [0xFF; 4];
const PLAIN: u8 = b'R';
const SECRET: u8 = b'S';

/// One decoded log-forwarding datagram
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub is_valid: bool,
    pub message: String,
}

impl LogRecord {
    fn invalid() -> Self {
        Self {
            is_valid: false,
            message: String::new(),
        }
    }
}

/// Decode a datagram sent by `logaddress_add`.
///
/// Layout: four `0xFF` bytes, then `R` and the message, or `S`, the log
/// secret and the message. The message ends in `\n\0`, which is trimmed.
pub fn parse_datagram(buf: &[u8], secret: Option<&str>) -> LogRecord {
    if buf.len() < 5 || buf[..4] != HEADER {
        return LogRecord::invalid();
    }

    let body = match (buf[4], secret) {
        (PLAIN, None) => &buf[5..],
        (SECRET, Some(secret)) => match buf[5..].strip_prefix(secret.as_bytes()) {
            Some(rest) => rest,
            None => return LogRecord::invalid(),
        },
        _ => return LogRecord::invalid(),
    };

    let text = String::from_utf8_lossy(body);
    LogRecord {
        is_valid: true,
        message: text.trim_end_matches(['\0', '\n', '\r']).to_string(),
    }
}

/// UDP listener for the server's log-forwarding stream.
pub struct LogReceiver {
    socket: UdpSocket,
    secret: Option<String>,
}

impl LogReceiver {
    pub async fn bind(addr: &str, secret: Option<&str>) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        tracing::info!("UDP log receiver listening on {}", socket.local_addr()?);
        Ok(Self {
            socket,
            secret: secret.map(str::to_string),
        })
    }

    pub fn local_addr(&self) -> io::Result<std::net::SocketAddr> {
        self.socket.local_addr()
    }

    /// Forward valid messages in arrival order until `lines` closes.
    pub async fn run(self, lines: mpsc::UnboundedSender<String>) {
        let mut buf = vec![0u8; 65_535];

        loop {
            let (len, peer) = match self.socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    tracing::warn!("Log receiver read failed: {}", e);
                    continue;
                }
            };

            let record = parse_datagram(&buf[..len], self.secret.as_deref());
            if !record.is_valid {
                tracing::debug!("Dropping invalid log datagram from {}", peer);
                continue;
            }

            if lines.send(record.message).is_err() {
                tracing::debug!("Log consumer gone, receiver stopping");
                return;
            }
        }
    }
}
