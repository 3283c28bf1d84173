use axum::{Router, extract::State, http::StatusCode, routing::post};
use std::io;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// Non-empty lines of a log callback body, split on `\r\n`, `\r` or `\n`
pub fn split_log_body(body: &str) -> impl Iterator<Item = &str> {
    body.split(['\r', '\n']).filter(|line| !line.is_empty())
}

/// Routes for the server's `logaddress_add_http` callbacks
pub fn log_routes(lines: mpsc::UnboundedSender<String>) -> Router {
    Router::new()
        .route("/log", post(receive_log))
        .with_state(lines)
}

async fn receive_log(
    State(lines): State<mpsc::UnboundedSender<String>>,
    body: String,
) -> StatusCode {
    for line in split_log_body(&body) {
        if lines.send(line.to_string()).is_err() {
            tracing::debug!("Log consumer gone, rejecting callback");
            return StatusCode::SERVICE_UNAVAILABLE;
        }
    }
    StatusCode::OK
}

/// HTTP listener for the log stream the server POSTs to `/log`.
pub struct HttpLogReceiver {
    listener: TcpListener,
}

impl HttpLogReceiver {
    pub async fn bind(addr: &str) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!("HTTP log receiver listening on {}", listener.local_addr()?);
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve callbacks, forwarding lines in arrival order.
    pub async fn run(self, lines: mpsc::UnboundedSender<String>) -> io::Result<()> {
        axum::serve(self.listener, log_routes(lines)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_split_log_body() {
        let lines: Vec<&str> = split_log_body("one\r\ntwo\rthree\n\nfour").collect();
        assert_eq!(lines, vec!["one", "two", "three", "four"]);
    }

    #[tokio::test]
    async fn test_posted_body_is_forwarded_line_by_line() {
        let receiver = HttpLogReceiver::bind("127.0.0.1:0").await.unwrap();
        let addr = receiver.local_addr().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        tokio::spawn(receiver.run(tx));

        let response = reqwest::Client::new()
            .post(format!("http://{}/log", addr))
            .body("L 10/12/2023 - 16:06:38: Log file started\r\nL 10/12/2023 - 16:06:39: Log file closed\n")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);

        let mut received = Vec::new();
        for _ in 0..2 {
            let line = tokio::time::timeout(Duration::from_secs(1), rx.recv())
                .await
                .unwrap()
                .unwrap();
            received.push(line);
        }
        assert_eq!(
            received,
            vec![
                "L 10/12/2023 - 16:06:38: Log file started",
                "L 10/12/2023 - 16:06:39: Log file closed"
            ]
        );
    }

    #[tokio::test]
    async fn test_other_paths_are_not_found() {
        let receiver = HttpLogReceiver::bind("127.0.0.1:0").await.unwrap();
        let addr = receiver.local_addr().unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        tokio::spawn(receiver.run(tx));

        let response = reqwest::Client::new()
            .post(format!("http://{}/status", addr))
            .body("x")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 404);
    }
}
