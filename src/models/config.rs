use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Daemon configuration from `srcds-control.yaml`
///
/// Every section falls back to its defaults when missing from the file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub rcon: RconSettings,
    pub server: ServerSettings,
    pub update: UpdateSettings,
    pub maps: MapSettings,
    pub timeouts: TimeoutSettings,
    pub log_receiver: LogReceiverSettings,
    /// SteamID64 of users allowed to control the server
    pub admins: Vec<String>,
    /// Commands run on game events, keyed by event
    pub scripts: IndexMap<HookEvent, String>,
    pub logging: LoggingSettings,
}

/// Game events that can trigger a configured script
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookEvent {
    LogStart,
    MapStart,
    MatchStart,
    RoundStart,
    RoundEnd,
    MatchEnd,
    LogEnd,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RconSettings {
    pub host: String,
    pub port: u16,
    pub password: String,
    pub max_packet_size: usize,
}

impl Default for RconSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 27015,
            password: String::new(),
            max_packet_size: 4096,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Server install directory, with trailing slash
    pub server_dir: String,
    /// Process name used to find a running server
    pub process_name: String,
    pub screen: String,
    pub screen_name: String,
    pub screen_log: String,
    /// Steam game server login token; omitted from the command line when empty
    pub server_token: String,
    pub optional_args: String,
    /// Address the server sends its HTTP log stream to
    pub local_ip: String,
    pub log_port: u16,
    pub default_map: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            server_dir: "/home/cs2/cs2_ds/".to_string(),
            process_name: "cs2".to_string(),
            screen: "/usr/bin/screen".to_string(),
            screen_name: "cs2Server".to_string(),
            screen_log: "/home/cs2/screen.log".to_string(),
            server_token: String::new(),
            optional_args: String::new(),
            local_ip: "127.0.0.1".to_string(),
            log_port: 8090,
            default_map: "de_dust2".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateSettings {
    pub steam_exe: String,
    /// steamcmd script; defaults to `<server_dir>update_cs2.txt` when empty
    pub update_script: String,
}

impl Default for UpdateSettings {
    fn default() -> Self {
        Self {
            steam_exe: "steamcmd".to_string(),
            update_script: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfficialMap {
    /// Workshop file id, empty when unknown
    #[serde(default)]
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MapSettings {
    /// Steam Web API key; remote catalog lookups are skipped when empty
    pub api_token: String,
    pub workshop_collection: String,
    pub workshop_maps: Vec<String>,
    pub official_maps: Vec<OfficialMap>,
    /// Refresh max rounds, current map and the catalog after each handshake
    pub refresh_on_auth: bool,
}

impl Default for MapSettings {
    fn default() -> Self {
        let official_maps = [
            "de_ancient",
            "de_anubis",
            "de_dust2",
            "de_inferno",
            "de_mirage",
            "de_nuke",
            "de_overpass",
            "de_vertigo",
            "de_train",
            "cs_italy",
            "cs_office",
        ]
        .iter()
        .map(|name| OfficialMap {
            id: String::new(),
            name: name.to_string(),
        })
        .collect();

        Self {
            api_token: String::new(),
            workshop_collection: String::new(),
            workshop_maps: Vec::new(),
            official_maps,
            refresh_on_auth: true,
        }
    }
}

/// Timeouts in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    pub connect_ms: u64,
    pub auth_ms: u64,
    pub command_ms: u64,
    pub mapchange_ms: u64,
    pub start_ms: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            connect_ms: 1000,
            auth_ms: 60_000,
            command_ms: 500,
            mapchange_ms: 30_000,
            start_ms: 90_000,
        }
    }
}

impl TimeoutSettings {
    pub fn connect(&self) -> Duration {
        Duration::from_millis(self.connect_ms)
    }

    pub fn auth(&self) -> Duration {
        Duration::from_millis(self.auth_ms)
    }

    pub fn command(&self) -> Duration {
        Duration::from_millis(self.command_ms)
    }

    pub fn mapchange(&self) -> Duration {
        Duration::from_millis(self.mapchange_ms)
    }

    pub fn start(&self) -> Duration {
        Duration::from_millis(self.start_ms)
    }
}

/// How the server forwards its log stream to the daemon
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogTransport {
    /// `logaddress_add_http`: POST bodies to `/log`
    #[default]
    Http,
    /// `logaddress_add`: log-forwarding datagrams
    Udp,
}

/// Listener for the server log stream.
///
/// The port is `server.log_port`, the same one the launch command hands to
/// the server, so the two cannot disagree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogReceiverSettings {
    pub enabled: bool,
    pub transport: LogTransport,
    pub bind_ip: String,
    /// `sv_logsecret` passed to the server (UDP only)
    pub secret: Option<String>,
}

impl Default for LogReceiverSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            transport: LogTransport::Http,
            bind_ip: "0.0.0.0".to_string(),
            secret: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub dir: String,
    pub prefix: String,
    /// `EnvFilter` directive, e.g. "info" or "srcds_control=debug"
    pub level: String,
    pub console: bool,
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            dir: "logs".to_string(),
            prefix: "srcds-control".to_string(),
            level: "info".to_string(),
            console: true,
            json: false,
        }
    }
}

impl ControlConfig {
    /// Configured command for a hook event, ignoring blank entries
    pub fn script(&self, event: HookEvent) -> Option<&str> {
        self.scripts
            .get(&event)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }

    /// Address the log receiver binds to
    pub fn log_listen_addr(&self) -> String {
        format!("{}:{}", self.log_receiver.bind_ip, self.server.log_port)
    }

    /// Server arguments that point its log stream at the receiver
    pub fn log_address_args(&self) -> String {
        let server = &self.server;
        match self.log_receiver.transport {
            LogTransport::Http => format!(
                "+logaddress_add_http \"http://{}:{}/log\"",
                server.local_ip, server.log_port
            ),
            LogTransport::Udp => {
                let mut args = format!("+logaddress_add {}:{}", server.local_ip, server.log_port);
                if let Some(secret) = self.log_secret() {
                    args.push_str(&format!(" +sv_logsecret {}", secret));
                }
                args
            }
        }
    }

    /// Configured log secret, ignoring blank values
    pub fn log_secret(&self) -> Option<&str> {
        self.log_receiver
            .secret
            .as_deref()
            .filter(|s| !s.trim().is_empty())
    }

    /// Full shell command line that launches the server inside screen.
    pub fn server_command_line(&self, map: &str) -> String {
        let server = &self.server;
        let mut command = format!(
            "{} -L -Logfile {} -dmS {} {}game/bin/linuxsteamrt64/cs2 -dedicated -console -usercon \
             -ip 0.0.0.0 +sv_logfile 1 -serverlogging {}",
            server.screen,
            server.screen_log,
            server.screen_name,
            server.server_dir,
            self.log_address_args(),
        );

        if !server.optional_args.trim().is_empty() {
            command.push(' ');
            command.push_str(server.optional_args.trim());
        }
        if !server.server_token.is_empty() {
            command.push_str(&format!(" +sv_setsteamaccount {}", server.server_token));
        }
        command.push_str(&format!(" +map {}", map));
        command
    }

    pub fn update_script(&self) -> String {
        if self.update.update_script.is_empty() {
            format!("{}update_cs2.txt", self.server.server_dir)
        } else {
            self.update.update_script.clone()
        }
    }

    /// Arguments passed to steamcmd for an update run
    pub fn update_args(&self) -> Vec<String> {
        vec!["+runscript".to_string(), self.update_script()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ControlConfig::default();
        assert_eq!(config.rcon.port, 27015);
        assert_eq!(config.rcon.max_packet_size, 4096);
        assert_eq!(config.timeouts.command(), Duration::from_millis(500));
        assert_eq!(config.timeouts.mapchange(), Duration::from_secs(30));
        assert_eq!(config.server.default_map, "de_dust2");
        assert!(config.script(HookEvent::RoundEnd).is_none());
    }

    #[test]
    fn test_command_line_without_token() {
        let mut config = ControlConfig::default();
        config.server.server_dir = "/srv/cs2/".to_string();
        config.server.local_ip = "10.0.0.5".to_string();

        let command = config.server_command_line("de_nuke");
        assert!(command.starts_with("/usr/bin/screen -L -Logfile /home/cs2/screen.log -dmS cs2Server"));
        assert!(command.contains("/srv/cs2/game/bin/linuxsteamrt64/cs2 -dedicated"));
        assert!(command.contains("+logaddress_add_http \"http://10.0.0.5:8090/log\""));
        assert!(!command.contains("sv_setsteamaccount"));
        assert!(command.ends_with("+map de_nuke"));
    }

    #[test]
    fn test_udp_log_address_matches_listener() {
        let mut config = ControlConfig::default();
        config.server.local_ip = "10.0.0.5".to_string();
        config.server.log_port = 27500;
        config.log_receiver.transport = LogTransport::Udp;
        config.log_receiver.secret = Some("hush".to_string());

        let command = config.server_command_line("de_nuke");
        assert!(command.contains("-serverlogging +logaddress_add 10.0.0.5:27500 +sv_logsecret hush"));
        assert!(!command.contains("logaddress_add_http"));
        assert_eq!(config.log_listen_addr(), "0.0.0.0:27500");
    }

    #[test]
    fn test_http_log_address_matches_listener() {
        let mut config = ControlConfig::default();
        config.server.log_port = 9100;

        let command = config.server_command_line("de_nuke");
        assert!(command.contains("+logaddress_add_http \"http://127.0.0.1:9100/log\""));
        assert!(config.log_listen_addr().ends_with(":9100"));
    }

    #[test]
    fn test_command_line_with_token_and_args() {
        let mut config = ControlConfig::default();
        config.server.server_token = "ABC123".to_string();
        config.server.optional_args = "+game_type 0 +game_mode 1".to_string();

        let command = config.server_command_line("de_dust2");
        assert!(command.contains("+game_type 0 +game_mode 1 +sv_setsteamaccount ABC123 +map de_dust2"));
    }

    #[test]
    fn test_update_script_default() {
        let config = ControlConfig::default();
        assert_eq!(config.update_args(), vec!["+runscript", "/home/cs2/cs2_ds/update_cs2.txt"]);
    }

    #[test]
    fn test_scripts_table_from_yaml() {
        let yaml = "scripts:\n  round_end: /opt/hooks/round_end.sh\n  map_start: '  '\n";
        let config: ControlConfig = serde_yaml_ng::from_str(yaml).unwrap();

        assert_eq!(config.script(HookEvent::RoundEnd), Some("/opt/hooks/round_end.sh"));
        assert_eq!(config.script(HookEvent::MapStart), None);
        assert_eq!(config.rcon.port, 27015);
    }
}
