//! Composition root of the daemon core.
//!
//! [`Controller`] owns every collaborator explicitly (no globals): the shared
//! [`StateManager`], the [`OperationTracker`], the RCON session behind the
//! single-concurrency [`CommandQueue`], the [`ProcessHost`] seam, the map
//! catalog and the log parser. It is cheap to clone; clones share everything.
//!
//! Log ingestion never blocks on RCON: follow-up queries triggered by a log
//! line are spawned and the next line is processed immediately.

use crate::broadcast::Broadcaster;
use crate::metrics::Metrics;
use crate::models::{
    ControlConfig, ControlState, HookEvent, MapDetail, MapFilterType, Operation, OperationAction,
    ServerInfoView,
};
use crate::operations::{AuthTicket, OperationPending, OperationTracker};
use crate::rcon::{CommandQueue, QueueError, RconClient, RconError, RconOptions};
use crate::services::catalog::{self, CatalogError, MapCatalog};
use crate::services::{
    LogEvent, LogParser, ProcessHost, UpdateScraper, UpdateSignal, cut_map_name, split_log_body,
};
use crate::state::StateManager;
use regex::Regex;
use std::io;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tokio::time::timeout;

static SAFE_INPUT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]*$").expect("Invalid safe input regex"));
static MAX_ROUNDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"mp_maxrounds"?\s*=\s*"?(\d+)"#).expect("Invalid max rounds regex")
});
static HOST_MAP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"host_map"?\s*=\s*"?([^"\s]+)"#).expect("Invalid host map regex")
});

const PAUSE_MARKER: &str = "Match pause is enabled - mp_pause_match";
const UNPAUSE_MARKER: &str = "Match pause is disabled - mp_unpause_match";

/// Errors surfaced to callers of controller operations
#[derive(Error, Debug)]
pub enum ControlError {
    #[error(transparent)]
    Busy(#[from] OperationPending),

    #[error("Server is already running")]
    AlreadyRunning,

    #[error("Server is not running")]
    NotRunning,

    #[error(transparent)]
    Rcon(#[from] RconError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("Unable to authenticate")]
    AuthFailed,

    #[error("Operation {0} was aborted")]
    Aborted(Operation),

    #[error("Operation {0} timed out after {1:?}")]
    Timeout(Operation, Duration),

    #[error("Failed to launch server: {0}")]
    Launch(#[source] io::Error),

    #[error("Map not available: {0}")]
    MapNotAvailable(String),

    #[error("Map change rejected: {0}")]
    MapChangeRejected(String),

    #[error("Update failed: {0}")]
    UpdateFailed(String),

    #[error("No running '{0}' process found")]
    ProcessNotFound(String),

    #[error("Failed to terminate server: {0}")]
    Kill(#[source] io::Error),

    #[error("Unsafe input rejected: {0:?}")]
    UnsafeInput(String),

    #[error("Map catalog unavailable: {0}")]
    Catalog(#[from] CatalogError),
}

/// Drives the dedicated server: RCON, process supervision and log ingestion.
#[derive(Clone)]
pub struct Controller {
    config: Arc<ControlConfig>,
    state: StateManager,
    operations: OperationTracker,
    rcon: Arc<Mutex<Option<RconClient>>>,
    queue: CommandQueue,
    host: Arc<dyn ProcessHost>,
    catalog: MapCatalog,
    parser: Arc<LogParser>,
    scraper: Arc<UpdateScraper>,
    metrics: Arc<Metrics>,
}

impl Controller {
    /// Must be called inside a tokio runtime (the command queue spawns its worker).
    pub fn new(
        config: Arc<ControlConfig>,
        state: StateManager,
        host: Arc<dyn ProcessHost>,
    ) -> Result<Self, ControlError> {
        let catalog = MapCatalog::new(&config.maps.api_token, config.maps.official_maps.clone())?;
        let operations = OperationTracker::new(state.clone());
        let queue = CommandQueue::new(config.timeouts.command());

        Ok(Self {
            config,
            state,
            operations,
            rcon: Arc::new(Mutex::new(None)),
            queue,
            host,
            catalog,
            parser: Arc::new(LogParser::new()),
            scraper: Arc::new(UpdateScraper::new()),
            metrics: Arc::new(Metrics::new()),
        })
    }

    pub fn config(&self) -> &ControlConfig {
        &self.config
    }

    pub fn state(&self) -> &StateManager {
        &self.state
    }

    pub fn operations(&self) -> &OperationTracker {
        &self.operations
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Fan-out handle for subscribers of state, operation and progress events
    pub fn broadcaster(&self) -> Broadcaster {
        Broadcaster::new(
            self.state.clone(),
            self.operations.clone(),
            Arc::clone(&self.metrics),
        )
    }

    pub fn snapshot(&self) -> ControlState {
        self.state.snapshot()
    }

    /// Filtered match information (`getAll`)
    pub fn info(&self) -> ServerInfoView {
        self.state.info_view()
    }

    // ---------------------------------------------------------------------
    // RCON
    // ---------------------------------------------------------------------

    /// Run a console command through the command queue.
    pub async fn execute_rcon(&self, command: &str) -> Result<String, ControlError> {
        let rcon = Arc::clone(&self.rcon);
        let command_owned = command.to_string();

        let result = self
            .queue
            .run(async move {
                let mut session = rcon.lock().await;
                match session.as_mut() {
                    Some(client) => client.execute(&command_owned).await,
                    None => Err(RconError::NotConnected),
                }
            })
            .await;

        match result {
            Ok(Ok(response)) => {
                self.metrics.record_rcon_command();
                tracing::debug!("RCON '{}' -> {} bytes", command, response.len());
                Ok(response)
            }
            Ok(Err(e)) => {
                self.metrics.record_rcon_failure();
                tracing::warn!("RCON '{}' failed: {}", command, e);
                if matches!(e, RconError::Closed | RconError::Write(_) | RconError::NotConnected) {
                    self.state.set_authenticated(false);
                }
                Err(e.into())
            }
            Err(e) => {
                self.metrics.record_rcon_failure();
                tracing::warn!("RCON '{}' failed: {}", command, e);
                Err(e.into())
            }
        }
    }

    /// Authenticate the RCON session.
    ///
    /// Returns true when authenticated afterwards. Concurrent callers share
    /// one handshake; an already authenticated session opens no connection.
    pub async fn authenticate(&self) -> bool {
        let auth_timeout = self.config.timeouts.auth();

        match self.operations.begin_auth() {
            AuthTicket::Authenticated => return true,
            AuthTicket::Follow(waiter) => {
                return match timeout(auth_timeout, waiter.wait()).await {
                    Ok(Some(OperationAction::End)) => true,
                    _ => self.state.is_authenticated(),
                };
            }
            AuthTicket::Lead => {}
        }

        self.metrics.record_operation_started();
        let success = match timeout(auth_timeout, self.handshake()).await {
            Ok(Ok(client)) => {
                *self.rcon.lock().await = Some(client);
                self.state.set_authenticated(true);
                true
            }
            Ok(Err(e)) => {
                tracing::error!("RCON authentication failed: {}", e);
                false
            }
            Err(_) => {
                tracing::error!("RCON authentication timed out after {:?}", auth_timeout);
                false
            }
        };

        if !success {
            self.metrics.record_operation_failed();
        }
        self.operations.finish_auth(success);

        if success && self.config.maps.refresh_on_auth {
            let controller = self.clone();
            tokio::spawn(async move { controller.refresh_after_auth().await });
        }

        success
    }

    async fn handshake(&self) -> Result<RconClient, RconError> {
        let options = RconOptions {
            host: self.config.rcon.host.clone(),
            port: self.config.rcon.port,
            max_packet_size: self.config.rcon.max_packet_size,
            connect_timeout: self.config.timeouts.connect(),
        };

        let mut client = RconClient::new(options);
        match client.authenticate(&self.config.rcon.password).await {
            Ok(()) | Err(RconError::AlreadyAuthenticated) => Ok(client),
            Err(e) => Err(e),
        }
    }

    async fn refresh_after_auth(&self) {
        if let Err(e) = self.query_max_rounds().await {
            tracing::warn!("Could not query mp_maxrounds: {}", e);
        }
        if let Err(e) = self.query_current_map().await {
            tracing::warn!("Could not query current map: {}", e);
        }
        self.reload_maplist().await;
    }

    /// Read `mp_maxrounds` from the server into the match information.
    pub async fn query_max_rounds(&self) -> Result<Option<u32>, ControlError> {
        let response = self.execute_rcon("mp_maxrounds").await?;
        let rounds = MAX_ROUNDS
            .captures(&response)
            .and_then(|c| c[1].parse::<u32>().ok());

        if let Some(rounds) = rounds {
            self.state.set_max_rounds(rounds);
        }
        Ok(rounds)
    }

    /// Read the current map from the server (`host_map`).
    pub async fn query_current_map(&self) -> Result<Option<String>, ControlError> {
        let response = self.execute_rcon("host_map").await?;
        let map = HOST_MAP
            .captures(&response)
            .map(|c| cut_map_name(&c[1]));

        if let Some(map) = &map {
            self.state.set_map(map);
        }
        Ok(map)
    }

    async fn drop_session(&self) {
        if let Some(mut client) = self.rcon.lock().await.take() {
            if let Err(e) = client.disconnect().await {
                tracing::debug!("RCON disconnect: {}", e);
            }
        }
    }

    // ---------------------------------------------------------------------
    // Process supervision
    // ---------------------------------------------------------------------

    /// Launch the server and wait until its RCON session is authenticated.
    ///
    /// An invalid or missing map name falls back to the configured default.
    pub async fn start(&self, map: Option<&str>) -> Result<(), ControlError> {
        self.operations.ensure_idle()?;
        if self.state.is_running() {
            return Err(ControlError::AlreadyRunning);
        }

        let map = self.safe_map(map);
        self.begin(Operation::Start)?;

        // Registered before launching so an early handshake is not missed
        let auth_waiter = self.operations.waiter(Operation::Auth);
        let start_waiter = self.operations.waiter(Operation::Start);

        let command_line = self.config.server_command_line(&map);
        if let Err(e) = self.on_host(move |host| host.launch(&command_line)).await {
            tracing::error!("Failed to launch server: {}", e);
            self.fail(Operation::Start);
            return Err(ControlError::Launch(e));
        }
        self.state.set_server_running(true);
        tracing::info!("Server launched with map {}", map);

        let start_timeout = self.config.timeouts.start();
        let outcome = timeout(start_timeout, async {
            tokio::select! {
                biased;
                // Nothing but kill finishes start from outside
                _ = start_waiter.wait() => None,
                action = auth_waiter.wait() => Some(action),
            }
        })
        .await;

        match outcome {
            Ok(Some(Some(OperationAction::End))) => {
                self.operations.end(Operation::Start);
                Ok(())
            }
            Ok(Some(_)) => {
                self.fail(Operation::Start);
                Err(ControlError::AuthFailed)
            }
            Ok(None) => {
                tracing::warn!("Start aborted before the server authenticated");
                // Kill may land between the launch and the running flag
                self.state.set_server_running(false);
                Err(ControlError::Aborted(Operation::Start))
            }
            Err(_) => {
                tracing::warn!("Server did not authenticate within {:?}", start_timeout);
                self.fail(Operation::Start);
                Err(ControlError::Timeout(Operation::Start, start_timeout))
            }
        }
    }

    /// Quit the server over RCON.
    ///
    /// The server may exit before acknowledging `quit`, so an RCON error still
    /// counts as stopped.
    pub async fn stop(&self) -> Result<(), ControlError> {
        self.operations.ensure_idle()?;
        if !self.state.is_running() {
            return Err(ControlError::NotRunning);
        }
        self.begin(Operation::Stop)?;

        if let Err(e) = self.execute_rcon("quit").await {
            tracing::debug!("quit returned {}", e);
        }

        self.drop_session().await;
        self.state.server_stopped();
        self.operations.end(Operation::Stop);
        tracing::info!("Server stopped");
        Ok(())
    }

    /// Terminate the server processes by signal, bypassing RCON.
    ///
    /// Aborts any pending operation. Returns the number of processes signalled.
    pub async fn kill(&self) -> Result<usize, ControlError> {
        let name = self.config.server.process_name.clone();
        let lookup_name = name.clone();
        let pids = self
            .on_host(move |host| host.find_processes(&lookup_name))
            .await
            .map_err(ControlError::Kill)?;

        if pids.is_empty() {
            return Err(ControlError::ProcessNotFound(name));
        }

        let signalled = pids.clone();
        let failures = self
            .on_host(move |host| {
                let errors: Vec<io::Error> = signalled
                    .iter()
                    .filter_map(|pid| host.terminate(*pid).err())
                    .collect();
                Ok(errors)
            })
            .await
            .map_err(ControlError::Kill)?;

        if let Some(aborted) = self.operations.abort() {
            self.metrics.record_operation_failed();
            tracing::warn!("Kill aborted pending operation {}", aborted);
        }
        self.drop_session().await;
        self.state.server_stopped();

        match failures.into_iter().next() {
            Some(e) => Err(ControlError::Kill(e)),
            None => {
                tracing::info!("Killed {} '{}' process(es)", pids.len(), name);
                Ok(pids.len())
            }
        }
    }

    /// Run steamcmd and report its progress. The server must be stopped.
    pub async fn update(&self) -> Result<(), ControlError> {
        self.operations.ensure_idle()?;
        if self.state.is_running() {
            return Err(ControlError::AlreadyRunning);
        }
        self.begin(Operation::Update)?;

        let program = self.config.update.steam_exe.clone();
        let args = self.config.update_args();
        let mut output = match self.on_host(move |host| host.spawn_update(&program, &args)).await {
            Ok(output) => output,
            Err(e) => {
                self.operations.report_progress("Update failed!", 100);
                self.fail(Operation::Update);
                return Err(ControlError::UpdateFailed(e.to_string()));
            }
        };

        while let Some(chunk) = output.recv().await {
            // steamcmd redraws progress lines with bare carriage returns
            for line in chunk.split(['\r', '\n']).filter(|l| !l.trim().is_empty()) {
                match self.scraper.scan(line) {
                    Some(UpdateSignal::Progress { step, progress }) => {
                        self.operations.report_progress(step, progress);
                    }
                    Some(UpdateSignal::Succeeded { step }) => {
                        self.operations.report_progress(step, 100);
                        self.operations.end(Operation::Update);
                        tracing::info!("Update finished");
                        return Ok(());
                    }
                    None => {}
                }
            }
        }

        self.operations.report_progress("Update failed!", 100);
        self.fail(Operation::Update);
        Err(ControlError::UpdateFailed(
            "update process exited without success".to_string(),
        ))
    }

    /// Mark the server as running if its process already exists, then authenticate.
    pub async fn detect_running(&self) -> bool {
        let name = self.config.server.process_name.clone();
        match self.on_host(move |host| host.find_processes(&name)).await {
            Ok(pids) if !pids.is_empty() => {
                tracing::info!("Found running server (pid {:?})", pids);
                self.state.set_server_running(true);
                let controller = self.clone();
                tokio::spawn(async move {
                    controller.authenticate().await;
                });
                true
            }
            Ok(_) => false,
            Err(e) => {
                tracing::warn!("Process lookup failed: {}", e);
                false
            }
        }
    }

    // ---------------------------------------------------------------------
    // Match control
    // ---------------------------------------------------------------------

    /// Change to a catalog map identified by workshop id, name or title.
    ///
    /// Completes when the server logs the new map loading, or fails after the
    /// mapchange timeout.
    pub async fn change_map(&self, identifier: &str) -> Result<(), ControlError> {
        self.begin(Operation::MapChange)?;

        let Some(map) = self.state.find_map(identifier) else {
            self.fail(Operation::MapChange);
            return Err(ControlError::MapNotAvailable(identifier.to_string()));
        };

        let waiter = self.operations.waiter(Operation::MapChange);
        let command = if map.official {
            format!("map {}", map.name)
        } else {
            format!("host_workshop_map {}", map.workshop_id)
        };

        let response = match self.execute_rcon(&command).await {
            Ok(response) => response,
            Err(e) => {
                self.fail(Operation::MapChange);
                return Err(e);
            }
        };

        let accepted = format!("CHostStateMgr::QueueNewRequest( Changelevel ({})", map.name);
        if map.official && !response.contains(&accepted) && self.fail(Operation::MapChange) {
            return Err(ControlError::MapChangeRejected(response.trim().to_string()));
        }

        let mapchange_timeout = self.config.timeouts.mapchange();
        match timeout(mapchange_timeout, waiter.wait()).await {
            Ok(Some(OperationAction::End)) => Ok(()),
            Ok(_) => Err(ControlError::MapChangeRejected(
                "map change aborted".to_string(),
            )),
            Err(_) => {
                tracing::warn!("Map change to {} timed out", map.name);
                self.fail(Operation::MapChange);
                Err(ControlError::Timeout(Operation::MapChange, mapchange_timeout))
            }
        }
    }

    /// Pause the match. `Ok(false)` when the server did not confirm.
    pub async fn pause(&self) -> Result<bool, ControlError> {
        self.set_match_pause(true).await
    }

    /// Resume the match. `Ok(false)` when the server did not confirm.
    pub async fn unpause(&self) -> Result<bool, ControlError> {
        self.set_match_pause(false).await
    }

    async fn set_match_pause(&self, pause: bool) -> Result<bool, ControlError> {
        self.operations.ensure_idle()?;
        if !self.state.is_running() {
            return Err(ControlError::NotRunning);
        }
        self.begin(Operation::Pause)?;

        let (command, marker) = if pause {
            ("mp_pause_match", PAUSE_MARKER)
        } else {
            ("mp_unpause_match", UNPAUSE_MARKER)
        };

        match self.execute_rcon(command).await {
            Ok(response) if response.contains(marker) => {
                self.state.set_pause(pause);
                self.operations.end(Operation::Pause);
                Ok(true)
            }
            Ok(_) => {
                self.fail(Operation::Pause);
                Ok(false)
            }
            Err(e) => {
                self.fail(Operation::Pause);
                Err(e)
            }
        }
    }

    // ---------------------------------------------------------------------
    // Map catalog and filters
    // ---------------------------------------------------------------------

    /// Rebuild the map catalog. Returns false when no map could be listed.
    ///
    /// Remote lookups degrade to name-only entries: official maps from the
    /// configuration, workshop maps from `ds_workshop_listmaps`.
    pub async fn reload_maplist(&self) -> bool {
        let mut details = match self.catalog.official_details().await {
            Ok(details) => details,
            Err(e) => {
                log_catalog_error("official maps", &e);
                Vec::new()
            }
        };
        for fallback in self.catalog.official_fallback() {
            if !details.iter().any(|d| d.name == fallback.name) {
                details.push(fallback);
            }
        }

        details.extend(self.workshop_maps().await);
        catalog::sort_by_title(&mut details);

        let count = details.len();
        self.state.set_maps(details);
        tracing::info!("Map catalog reloaded: {} maps", count);
        count > 0
    }

    async fn workshop_maps(&self) -> Vec<MapDetail> {
        let mut ids = self.config.maps.workshop_maps.clone();
        let collection = &self.config.maps.workshop_collection;
        if !collection.is_empty() {
            match self.catalog.collection_children(collection).await {
                Ok(children) => ids.extend(children),
                Err(e) => log_catalog_error("workshop collection", &e),
            }
        }

        if !ids.is_empty() {
            match self.catalog.map_details(&ids, false).await {
                Ok(details) => return details,
                Err(e) => log_catalog_error("workshop maps", &e),
            }
        }

        if !self.state.is_authenticated() {
            return Vec::new();
        }
        match self.execute_rcon("ds_workshop_listmaps").await {
            Ok(listing) => catalog::workshop_maps_from_listing(&listing),
            Err(e) => {
                tracing::warn!("Could not list workshop maps from server: {}", e);
                Vec::new()
            }
        }
    }

    /// Catalog entry by workshop id, name or title
    pub fn get_map(&self, identifier: &str) -> Option<MapDetail> {
        self.state.find_map(identifier)
    }

    /// Add a filter; returns the number of filters afterwards.
    pub fn map_filter_add(&self, filter: &str) -> Result<usize, ControlError> {
        ensure_safe(filter)?;
        Ok(self.state.map_filter_add(filter))
    }

    /// Remove a filter; returns the number of filters afterwards.
    pub fn map_filter_remove(&self, filter: &str) -> usize {
        self.state.map_filter_remove(filter)
    }

    pub fn map_filter_reset(&self) {
        self.state.map_filter_reset();
    }

    pub fn map_filter_type_set(&self, filter_type: MapFilterType) {
        self.state.set_map_filter_type(filter_type);
    }

    // ---------------------------------------------------------------------
    // Log ingestion
    // ---------------------------------------------------------------------

    /// Process lines from a receiver in arrival order until it closes.
    pub async fn ingest(&self, mut lines: mpsc::UnboundedReceiver<String>) {
        while let Some(line) = lines.recv().await {
            self.handle_log_line(&line);
        }
        tracing::debug!("Log ingestion stopped");
    }

    /// Process an HTTP log callback body (one line per line break).
    pub fn ingest_body(&self, body: &str) {
        for line in split_log_body(body) {
            self.handle_log_line(line);
        }
    }

    /// Apply one server log line. Must be called inside a tokio runtime.
    pub fn handle_log_line(&self, line: &str) {
        let Some(event) = self.parser.parse(line) else {
            self.metrics.record_log_line(false);
            return;
        };
        self.metrics.record_log_line(true);
        tracing::trace!("Log event: {:?}", event);

        match event {
            LogEvent::LogStarted => {
                self.run_hook(HookEvent::LogStart);
                if !self.state.is_authenticated() {
                    let controller = self.clone();
                    tokio::spawn(async move {
                        controller.authenticate().await;
                    });
                }
            }
            LogEvent::MapLoading { map } => {
                tracing::info!("Map loading: {}", map);
                self.state.map_loaded(&map);
                self.operations.end(Operation::MapChange);
                self.run_hook(HookEvent::MapStart);
            }
            LogEvent::MatchStart { map } => {
                let controller = self.clone();
                tokio::spawn(async move {
                    if let Err(e) = controller.query_max_rounds().await {
                        tracing::debug!("Could not refresh mp_maxrounds: {}", e);
                    }
                });
                self.state.new_match();
                if !map.is_empty() {
                    self.state.set_map(&map);
                }
                self.run_hook(HookEvent::MatchStart);
            }
            LogEvent::RoundStart => self.run_hook(HookEvent::RoundStart),
            LogEvent::TeamScored { side, score } => {
                self.state.set_score(side, score);
            }
            LogEvent::RoundEnd => self.run_hook(HookEvent::RoundEnd),
            LogEvent::GameOver => self.run_hook(HookEvent::MatchEnd),
            LogEvent::PlayerEntered { name, steam_id } => {
                self.state.add_player(&name, &steam_id);
            }
            LogEvent::PlayerDisconnected { steam_id } => {
                self.state.remove_player(&steam_id);
            }
            LogEvent::TeamSwitch {
                name,
                steam_id,
                team,
            } => {
                self.state.assign_player(&name, &steam_id, team);
            }
            LogEvent::Kill { killer, victim } => {
                self.state.record_kill(killer.as_deref(), victim.as_deref());
            }
            LogEvent::LogClosed => self.run_hook(HookEvent::LogEnd),
        }
    }

    fn run_hook(&self, event: HookEvent) {
        if let Some(command) = self.config.script(event) {
            self.host.run_script(command);
        }
    }

    // ---------------------------------------------------------------------
    // Helpers
    // ---------------------------------------------------------------------

    fn begin(&self, operation: Operation) -> Result<(), ControlError> {
        self.operations.begin(operation)?;
        self.metrics.record_operation_started();
        Ok(())
    }

    fn fail(&self, operation: Operation) -> bool {
        let failed = self.operations.fail(operation);
        if failed {
            self.metrics.record_operation_failed();
        }
        failed
    }

    fn safe_map(&self, map: Option<&str>) -> String {
        match map {
            Some(map) if !map.is_empty() && SAFE_INPUT.is_match(map) => map.to_string(),
            Some(map) if !map.is_empty() => {
                tracing::warn!(
                    "Rejected map name {:?}, using {}",
                    map,
                    self.config.server.default_map
                );
                self.config.server.default_map.clone()
            }
            _ => self.config.server.default_map.clone(),
        }
    }

    /// Run a blocking host call off the async workers.
    async fn on_host<T, F>(&self, f: F) -> io::Result<T>
    where
        F: FnOnce(&dyn ProcessHost) -> io::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let host = Arc::clone(&self.host);
        tokio::task::spawn_blocking(move || f(host.as_ref()))
            .await
            .map_err(io::Error::other)?
    }
}

fn ensure_safe(input: &str) -> Result<(), ControlError> {
    if SAFE_INPUT.is_match(input) {
        Ok(())
    } else {
        Err(ControlError::UnsafeInput(input.to_string()))
    }
}

fn log_catalog_error(what: &str, error: &CatalogError) {
    match error {
        CatalogError::NoApiToken => tracing::debug!("Skipping Steam lookup of {}: no API token", what),
        other => tracing::warn!("Steam lookup of {} failed: {}", what, other),
    }
}
