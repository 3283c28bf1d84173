use regex::Regex;
use std::io;
use std::process::Command;
use tokio::sync::mpsc;

/// Access to the host's processes.
///
/// The controller only talks to the operating system through this trait, so
/// supervisor paths can be exercised without a game server installed.
#[cfg_attr(test, mockall::automock)]
pub trait ProcessHost: Send + Sync {
    /// Run a shell command line to completion (screen detaches immediately).
    fn launch(&self, command_line: &str) -> io::Result<()>;

    /// Pids of processes whose command name equals `name`.
    fn find_processes(&self, name: &str) -> io::Result<Vec<i32>>;

    /// Send SIGTERM to `pid`.
    fn terminate(&self, pid: i32) -> io::Result<()>;

    /// Start `program` attached to a pseudo-terminal and stream its output.
    ///
    /// The receiver closes when the process exits.
    fn spawn_update(
        &self,
        program: &str,
        args: &[String],
    ) -> io::Result<mpsc::UnboundedReceiver<String>>;

    /// Run a hook command detached; never waited on.
    fn run_script(&self, command: &str);
}

/// [`ProcessHost`] backed by the local machine
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemHost;

impl SystemHost {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessHost for SystemHost {
    fn launch(&self, command_line: &str) -> io::Result<()> {
        tracing::info!("Launching: {}", command_line);
        let status = Command::new("sh").arg("-c").arg(command_line).status()?;

        if status.success() {
            Ok(())
        } else {
            Err(io::Error::other(format!("launch exited with {}", status)))
        }
    }

    fn find_processes(&self, name: &str) -> io::Result<Vec<i32>> {
        let output = Command::new("ps").arg("-A").output()?;
        if !output.status.success() {
            return Err(io::Error::other(format!("ps exited with {}", output.status)));
        }
        Ok(parse_process_list(&String::from_utf8_lossy(&output.stdout), name))
    }

    #[cfg(unix)]
    fn terminate(&self, pid: i32) -> io::Result<()> {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        kill(Pid::from_raw(pid), Signal::SIGTERM).map_err(io::Error::from)
    }

    #[cfg(not(unix))]
    fn terminate(&self, pid: i32) -> io::Result<()> {
        let status = Command::new("kill").arg(pid.to_string()).status()?;
        if status.success() {
            Ok(())
        } else {
            Err(io::Error::other(format!("kill exited with {}", status)))
        }
    }

    fn spawn_update(
        &self,
        program: &str,
        args: &[String],
    ) -> io::Result<mpsc::UnboundedReceiver<String>> {
        tracing::info!("Starting update: {} {}", program, args.join(" "));
        spawn_with_terminal(program, args)
    }

    fn run_script(&self, command: &str) {
        tracing::debug!("Running hook: {}", command);
        // tokio reaps the child in the background once it is dropped
        if let Err(e) = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .spawn()
        {
            tracing::error!("Failed to run hook '{}': {}", command, e);
        }
    }
}

#[cfg(unix)]
fn spawn_with_terminal(
    program: &str,
    args: &[String],
) -> io::Result<mpsc::UnboundedReceiver<String>> {
    use nix::pty::openpty;
    use std::fs::File;
    use std::process::Stdio;

    let pty = openpty(None, None).map_err(io::Error::from)?;

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::from(pty.slave.try_clone()?))
        .stdout(Stdio::from(pty.slave.try_clone()?))
        .stderr(Stdio::from(pty.slave));
    let child = command.spawn()?;
    // Our copies of the slave end must be closed or the reader never sees EOF
    drop(command);

    let master = File::from(pty.master);
    Ok(stream_output(master, child))
}

#[cfg(not(unix))]
fn spawn_with_terminal(
    program: &str,
    args: &[String],
) -> io::Result<mpsc::UnboundedReceiver<String>> {
    use std::process::Stdio;

    let mut child = Command::new(program)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::other("child stdout unavailable"))?;
    Ok(stream_output(stdout, child))
}

/// Forward raw output chunks from a blocking reader until it closes.
fn stream_output<R>(mut reader: R, mut child: std::process::Child) -> mpsc::UnboundedReceiver<String>
where
    R: io::Read + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();

    std::thread::spawn(move || {
        let mut buf = [0u8; 4096];
        loop {
            match reader.read(&mut buf) {
                // EIO on the pty master means the child side hung up
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    let chunk = String::from_utf8_lossy(&buf[..n]).into_owned();
                    if tx.send(chunk).is_err() {
                        break;
                    }
                }
            }
        }

        match child.wait() {
            Ok(status) => tracing::debug!("Update process exited with {}", status),
            Err(e) => tracing::warn!("Failed to reap update process: {}", e),
        }
    });

    rx
}

/// Pids from `ps -A` output whose command column equals `name`.
pub fn parse_process_list(output: &str, name: &str) -> Vec<i32> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let pid = fields.next()?.parse::<i32>().ok()?;
            let command = fields.last()?;
            (command == name).then_some(pid)
        })
        .collect()
}

/// What an update output chunk tells us
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateSignal {
    Progress { step: String, progress: u8 },
    /// Terminal success marker; carries the final progress step
    Succeeded { step: String },
}

/// Recognises steamcmd milestones in update output.
///
/// Holds pre-compiled regexes for the lines that carry values.
pub struct UpdateScraper {
    login_failed: Regex,
    update_state: Regex,
    downloading: Regex,
}

impl UpdateScraper {
    pub fn new() -> Self {
        Self {
            login_failed: Regex::new(r"FAILED \((.+)\)").expect("Invalid login failure regex"),
            update_state: Regex::new(r"Update state \(0x[0-9a-fA-F]+\) (.+), progress: (\d{1,3})\.\d{2}")
                .expect("Invalid update state regex"),
            downloading: Regex::new(r"\[\s*(\d{1,3})%\] Download")
                .expect("Invalid download progress regex"),
        }
    }

    /// Classify one output chunk; `None` when it carries no milestone.
    pub fn scan(&self, chunk: &str) -> Option<UpdateSignal> {
        let progress = |step: &str, progress: u8| {
            Some(UpdateSignal::Progress {
                step: step.to_string(),
                progress,
            })
        };

        if chunk.contains("Checking for available updates") {
            progress("Checking Steam client updates", 0)
        } else if chunk.contains("Verifying installation") {
            progress("Verifying client installation", 0)
        } else if chunk.contains("Logging in user") {
            progress("Logging in steam user", 0)
        } else if let Some(c) = self.login_failed.captures(chunk) {
            progress(&format!("Login Failed: {}", &c[1]), 0)
        } else if chunk.contains("Logged in OK") {
            progress("Login OK", 100)
        } else if let Some(c) = self.update_state.captures(chunk) {
            progress(&c[1], c[2].parse().unwrap_or(0))
        } else if let Some(c) = self.downloading.captures(chunk) {
            progress("Updating Steam client", c[1].parse().unwrap_or(0))
        } else if chunk.contains("Success!") {
            Some(UpdateSignal::Succeeded {
                step: "Update successful!".to_string(),
            })
        } else {
            None
        }
    }
}

impl Default for UpdateScraper {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_process_list() {
        let output = "    PID TTY          TIME CMD\n\
                      1 ?        00:00:03 systemd\n\
                      4242 ?        01:12:44 cs2\n\
                      4300 pts/0    00:00:00 cs2-helper\n\
                      5000 ?        00:00:01 cs2\n";

        assert_eq!(parse_process_list(output, "cs2"), vec![4242, 5000]);
        assert!(parse_process_list(output, "srcds_linux").is_empty());
    }

    #[test]
    fn test_scan_milestones() {
        let scraper = UpdateScraper::new();

        assert_eq!(
            scraper.scan("[  0%] Checking for available updates..."),
            Some(UpdateSignal::Progress {
                step: "Checking Steam client updates".to_string(),
                progress: 0
            })
        );
        assert_eq!(
            scraper.scan("Logging in user 'anonymous' to Steam Public...OK"),
            Some(UpdateSignal::Progress {
                step: "Logging in steam user".to_string(),
                progress: 0
            })
        );
        assert_eq!(
            scraper.scan("Logging in... FAILED (Invalid Password)"),
            Some(UpdateSignal::Progress {
                step: "Login Failed: Invalid Password".to_string(),
                progress: 0
            })
        );
        assert_eq!(
            scraper.scan("Waiting for user info...Logged in OK"),
            Some(UpdateSignal::Progress {
                step: "Login OK".to_string(),
                progress: 100
            })
        );
    }

    #[test]
    fn test_scan_progress_values() {
        let scraper = UpdateScraper::new();

        assert_eq!(
            scraper.scan(" Update state (0x61) downloading, progress: 42.17 (1234 / 5678)"),
            Some(UpdateSignal::Progress {
                step: "downloading".to_string(),
                progress: 42
            })
        );
        assert_eq!(
            scraper.scan("[ 35%] Downloading update (12,345 of 40,000 KB)..."),
            Some(UpdateSignal::Progress {
                step: "Updating Steam client".to_string(),
                progress: 35
            })
        );
    }

    #[test]
    fn test_scan_success_and_noise() {
        let scraper = UpdateScraper::new();

        assert_eq!(
            scraper.scan("Success! App '730' fully installed."),
            Some(UpdateSignal::Succeeded {
                step: "Update successful!".to_string()
            })
        );
        assert_eq!(scraper.scan("Redirecting stderr to '/home/steam/logs'"), None);
    }
}
