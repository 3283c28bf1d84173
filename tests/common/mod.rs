//! Shared helpers for integration tests: an in-process RCON server speaking
//! the Source wire format and a recording [`ProcessHost`].

#![allow(dead_code)]

use srcds_control::models::ControlConfig;
use srcds_control::rcon::packet::{
    self, FrameBuffer, SERVERDATA_AUTH, SERVERDATA_AUTH_RESPONSE, SERVERDATA_EXECCOMMAND,
    SERVERDATA_RESPONSE_VALUE,
};
use srcds_control::services::ProcessHost;
use srcds_control::{Controller, StateManager};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

pub const PASSWORD: &str = "hunter2";
pub const LOG_PREFIX: &str = "L 10/12/2023 - 16:06:38: ";

pub fn log_line(rest: &str) -> String {
    format!("{}{}", LOG_PREFIX, rest)
}

/// RCON server stand-in recording every command it executes.
#[derive(Clone)]
pub struct FakeRcon {
    pub port: u16,
    connections: Arc<AtomicUsize>,
    commands: Arc<Mutex<Vec<String>>>,
}

impl FakeRcon {
    pub async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = Self {
            port,
            connections: Arc::new(AtomicUsize::new(0)),
            commands: Arc::new(Mutex::new(Vec::new())),
        };

        let accept = server.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                accept.connections.fetch_add(1, Ordering::SeqCst);
                let session = accept.clone();
                tokio::spawn(async move { session.serve(stream).await });
            }
        });

        server
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    async fn serve(&self, mut stream: TcpStream) {
        let mut frames = FrameBuffer::new(packet::DEFAULT_MAX_PACKET_SIZE);

        while let Ok(Some(request)) = packet::read_packet(&mut stream, &mut frames).await {
            match request.kind {
                SERVERDATA_AUTH => {
                    let id = if request.body == PASSWORD { request.id } else { -1 };
                    // Real servers send an empty response value first
                    send(&mut stream, SERVERDATA_RESPONSE_VALUE, request.id, "").await;
                    send(&mut stream, SERVERDATA_AUTH_RESPONSE, id, "").await;
                }
                SERVERDATA_EXECCOMMAND => {
                    let command = request.body.clone();
                    self.commands.lock().unwrap().push(command.clone());

                    let output = reply(&command);
                    if !output.is_empty() {
                        send(&mut stream, SERVERDATA_RESPONSE_VALUE, request.id, &output).await;
                    }
                    let echo = format!("rcon from \"127.0.0.1:50000\": command \"{}\"\n", command);
                    send(&mut stream, SERVERDATA_RESPONSE_VALUE, request.id, &echo).await;

                    if command == "quit" {
                        return;
                    }
                }
                _ => {}
            }
        }
    }
}

fn reply(command: &str) -> String {
    match command.split_once(' ') {
        Some(("map", name)) => format!(
            "CHostStateMgr::QueueNewRequest( Changelevel ({}), 1 )\n",
            name
        ),
        Some(("host_workshop_map", id)) => format!("Workshop map {} queued\n", id),
        _ => match command {
            "mp_maxrounds" => "mp_maxrounds = 24\n".to_string(),
            "host_map" => "host_map = \"de_mirage\"\n".to_string(),
            "mp_pause_match" => "Match pause is enabled - mp_pause_match\n".to_string(),
            "mp_unpause_match" => "Match pause is disabled - mp_unpause_match\n".to_string(),
            "ds_workshop_listmaps" => "de_cache\nde_tuscan\n".to_string(),
            _ => String::new(),
        },
    }
}

async fn send(stream: &mut TcpStream, kind: i32, id: i32, body: &str) {
    let bytes = packet::encode(kind, id, body, packet::DEFAULT_MAX_PACKET_SIZE).unwrap();
    let _ = stream.write_all(&bytes).await;
}

/// Process host that records calls instead of touching the machine.
#[derive(Default)]
pub struct RecordingHost {
    pub launches: Mutex<Vec<String>>,
    pub pids: Mutex<Vec<i32>>,
    pub terminated: Mutex<Vec<i32>>,
    pub scripts: Mutex<Vec<String>>,
    pub update_output: Mutex<Vec<String>>,
}

impl RecordingHost {
    pub fn launched(&self) -> bool {
        !self.launches.lock().unwrap().is_empty()
    }
}

impl ProcessHost for RecordingHost {
    fn launch(&self, command_line: &str) -> io::Result<()> {
        self.launches.lock().unwrap().push(command_line.to_string());
        Ok(())
    }

    fn find_processes(&self, _name: &str) -> io::Result<Vec<i32>> {
        Ok(self.pids.lock().unwrap().clone())
    }

    fn terminate(&self, pid: i32) -> io::Result<()> {
        self.terminated.lock().unwrap().push(pid);
        Ok(())
    }

    fn spawn_update(
        &self,
        _program: &str,
        _args: &[String],
    ) -> io::Result<mpsc::UnboundedReceiver<String>> {
        let (tx, rx) = mpsc::unbounded_channel();
        for chunk in self.update_output.lock().unwrap().iter() {
            let _ = tx.send(chunk.clone());
        }
        Ok(rx)
    }

    fn run_script(&self, command: &str) {
        self.scripts.lock().unwrap().push(command.to_string());
    }
}

pub fn test_config(rcon_port: u16) -> ControlConfig {
    let mut config = ControlConfig::default();
    config.rcon.port = rcon_port;
    config.rcon.password = PASSWORD.to_string();
    config.maps.refresh_on_auth = false;
    config.timeouts.start_ms = 5_000;
    config.timeouts.auth_ms = 2_000;
    config
}

pub fn controller(config: ControlConfig, host: Arc<RecordingHost>) -> Controller {
    Controller::new(Arc::new(config), StateManager::new(), host).unwrap()
}

/// Poll `condition` until it holds, panicking after two seconds.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
