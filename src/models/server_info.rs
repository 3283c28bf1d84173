use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Map filters applied by default to hide non-competitive maps
pub const DEFAULT_MAP_FILTERS: [&str; 5] = ["ar_", "dz_", "gd_", "lobby_", "training1"];

/// Catalog entry for a playable map
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapDetail {
    pub name: String,
    pub official: bool,
    pub title: String,
    #[serde(rename = "workshopID")]
    pub workshop_id: String,
    pub description: String,
    pub preview_link: String,
    pub tags: Vec<String>,
}

impl MapDetail {
    /// Entry carrying only a name and id, used when the remote lookup is unavailable
    pub fn name_only(name: &str, workshop_id: &str, official: bool) -> Self {
        Self {
            name: name.to_string(),
            official,
            title: name.to_string(),
            workshop_id: workshop_id.to_string(),
            description: String::new(),
            preview_link: String::new(),
            tags: Vec::new(),
        }
    }
}

/// Team assignment of a player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Team {
    #[default]
    #[serde(rename = "U")]
    Unassigned,
    #[serde(rename = "T")]
    Terrorist,
    #[serde(rename = "C")]
    CounterTerrorist,
    #[serde(rename = "S")]
    Spectator,
}

impl Team {
    /// Map a team name as it appears in the log ("TERRORIST", "CT", "Spectator",
    /// "Unassigned") by its first letter.
    pub fn from_log_name(name: &str) -> Self {
        match name.chars().next() {
            Some('T') => Team::Terrorist,
            Some('C') => Team::CounterTerrorist,
            Some('S') => Team::Spectator,
            _ => Team::Unassigned,
        }
    }
}

/// Side that can score rounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeamSide {
    T,
    C,
}

impl TeamSide {
    pub fn from_code(code: char) -> Option<Self> {
        match code {
            'T' => Some(TeamSide::T),
            'C' => Some(TeamSide::C),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub name: String,
    #[serde(rename = "steamID")]
    pub steam_id: String,
    pub team: Team,
    pub kills: u32,
    pub deaths: u32,
    pub disconnected: bool,
}

impl Player {
    fn new(name: &str, steam_id: &str) -> Self {
        Self {
            name: name.to_string(),
            steam_id: steam_id.to_string(),
            team: Team::Unassigned,
            kills: 0,
            deaths: 0,
            disconnected: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    #[serde(rename = "T")]
    pub t: u32,
    #[serde(rename = "C")]
    pub c: u32,
}

/// Whether map filters whitelist or blacklist matching names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MapFilterType {
    Include,
    #[default]
    Exclude,
}

impl FromStr for MapFilterType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "include" => Ok(MapFilterType::Include),
            "exclude" => Ok(MapFilterType::Exclude),
            other => Err(format!("Unknown map filter type: {}", other)),
        }
    }
}

/// Live information about the running match.
///
/// Mutated only through [`StateManager`](crate::state::StateManager), which
/// emits a change notification for every update that alters it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    pub current_map: String,
    pub maps_available: Vec<String>,
    pub maps_details: Vec<MapDetail>,
    pub map_filter_type: MapFilterType,
    pub map_filters: IndexSet<String>,
    pub max_rounds: u32,
    pub pause: bool,
    pub score: Score,
    pub players: Vec<Player>,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            current_map: String::new(),
            maps_available: Vec::new(),
            maps_details: Vec::new(),
            map_filter_type: MapFilterType::Exclude,
            map_filters: DEFAULT_MAP_FILTERS.iter().map(|f| f.to_string()).collect(),
            max_rounds: 0,
            pause: false,
            score: Score::default(),
            players: Vec::new(),
        }
    }
}

/// Serialisable snapshot handed to subscribers, with map lists already filtered
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfoView {
    pub map: String,
    pub maps_avail: Vec<String>,
    pub maps_details: Vec<MapDetail>,
    pub max_rounds: u32,
    pub score: Score,
    pub pause: bool,
    pub players: Vec<Player>,
}

impl ServerInfo {
    /// Substring containment against the filter set; an empty set passes everything.
    fn passes_filter(&self, name: &str) -> bool {
        if self.map_filters.is_empty() {
            return true;
        }
        let found = self.map_filters.iter().any(|f| name.contains(f.as_str()));
        match self.map_filter_type {
            MapFilterType::Include => found,
            MapFilterType::Exclude => !found,
        }
    }

    /// Available map names after filtering
    pub fn map_list(&self) -> Vec<String> {
        self.maps_available
            .iter()
            .filter(|m| self.passes_filter(m))
            .cloned()
            .collect()
    }

    /// Catalog entries after filtering
    pub fn map_details(&self) -> Vec<MapDetail> {
        self.maps_details
            .iter()
            .filter(|m| self.passes_filter(&m.name))
            .cloned()
            .collect()
    }

    /// Look up a catalog entry by workshop id, name or title.
    ///
    /// When several entries match, the last one in catalog order wins. A blank
    /// identifier matches nothing, and entries without a workshop id are only
    /// found by name or title.
    pub fn find_map(&self, identifier: &str) -> Option<&MapDetail> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return None;
        }

        self.maps_details.iter().rev().find(|m| {
            (!m.workshop_id.is_empty() && m.workshop_id == identifier)
                || m.name == identifier
                || m.title == identifier
        })
    }

    /// Returns the number of filters afterwards.
    pub fn map_filter_add(&mut self, filter: &str) -> usize {
        self.map_filters.insert(filter.to_string());
        self.map_filters.len()
    }

    /// Returns the number of filters afterwards.
    pub fn map_filter_remove(&mut self, filter: &str) -> usize {
        self.map_filters.shift_remove(filter);
        self.map_filters.len()
    }

    pub fn map_filter_reset(&mut self) {
        self.map_filter_type = MapFilterType::Exclude;
        self.map_filters.clear();
    }

    /// Insert or refresh a player; clears a previous disconnect mark.
    pub fn add_player(&mut self, name: &str, steam_id: &str) {
        match self.players.iter_mut().find(|p| p.steam_id == steam_id) {
            Some(player) => {
                player.name = name.to_string();
                player.disconnected = false;
            }
            None => self.players.push(Player::new(name, steam_id)),
        }
    }

    /// Set a player's team, creating the player when unknown.
    pub fn assign_player(&mut self, name: &str, steam_id: &str, team: Team) {
        match self.players.iter_mut().find(|p| p.steam_id == steam_id) {
            Some(player) => player.team = team,
            None => {
                let mut player = Player::new(name, steam_id);
                player.team = team;
                self.players.push(player);
            }
        }
    }

    /// Soft delete: the player stays listed with `disconnected` set.
    pub fn remove_player(&mut self, steam_id: &str) {
        if let Some(player) = self.players.iter_mut().find(|p| p.steam_id == steam_id) {
            player.disconnected = true;
        }
    }

    pub fn clear_players(&mut self) {
        self.players.clear();
    }

    /// Credit a kill. `None` stands for a bot, which has no roster entry.
    pub fn record_kill(&mut self, killer: Option<&str>, victim: Option<&str>) {
        if let Some(killer) = killer {
            if let Some(player) = self.players.iter_mut().find(|p| p.steam_id == killer) {
                player.kills += 1;
            }
        }
        if let Some(victim) = victim {
            if let Some(player) = self.players.iter_mut().find(|p| p.steam_id == victim) {
                player.deaths += 1;
            }
        }
    }

    pub fn set_score(&mut self, side: TeamSide, score: u32) {
        match side {
            TeamSide::T => self.score.t = score,
            TeamSide::C => self.score.c = score,
        }
    }

    /// Zero the score and per-player stats.
    pub fn new_match(&mut self) {
        self.score = Score::default();
        for player in &mut self.players {
            player.kills = 0;
            player.deaths = 0;
        }
    }

    /// Clear everything tied to a running server. Map filters survive.
    pub fn reset(&mut self) {
        self.current_map.clear();
        self.maps_available.clear();
        self.maps_details.clear();
        self.max_rounds = 0;
        self.pause = false;
        self.clear_players();
        self.new_match();
    }

    pub fn view(&self) -> ServerInfoView {
        ServerInfoView {
            map: self.current_map.clone(),
            maps_avail: self.map_list(),
            maps_details: self.map_details(),
            max_rounds: self.max_rounds,
            score: self.score,
            pause: self.pause,
            players: self.players.clone(),
        }
    }
}
