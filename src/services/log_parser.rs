use crate::models::{Team, TeamSide};
use regex::{Captures, Regex};
use std::sync::LazyLock;

static WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\w+").expect("Invalid word regex"));

/// Lines shorter than this carry no event and are skipped
pub const MIN_LINE_LEN: usize = 20;

/// Game event recognised in a server log line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEvent {
    LogStarted,
    MapLoading { map: String },
    MatchStart { map: String },
    RoundStart,
    TeamScored { side: TeamSide, score: u32 },
    RoundEnd,
    GameOver,
    PlayerEntered { name: String, steam_id: String },
    PlayerDisconnected { steam_id: String },
    TeamSwitch { name: String, steam_id: String, team: Team },
    /// Either side is `None` when it is a bot
    Kill {
        killer: Option<String>,
        victim: Option<String>,
    },
    LogClosed,
}

/// Builds an event from the captures of a matched line; `None` for malformed input
type Extract = fn(&Captures<'_>) -> Option<LogEvent>;

struct LineMatcher {
    pattern: Regex,
    extract: Extract,
}

fn rule(pattern: impl AsRef<str>, extract: Extract) -> LineMatcher {
    LineMatcher {
        pattern: Regex::new(pattern.as_ref()).expect("Invalid log line regex"),
        extract,
    }
}

/// Player block as written by the server: `"Name<uid><[U:1:123]><TEAM>"`.
/// The trailing team block is absent on team-switch lines.
const PLAYER: &str = r#""(.+?)<\d+><\[(U:\d+:\d+)\]>(?:<[^>]*>)?""#;

/// Either side of a kill: a player block, or a bot (`<BOT>` instead of the steamID).
const COMBATANT: &str = r#""(.+?)<\d+><(?:\[(U:\d+:\d+)\]|BOT)><[^>]*>""#;

/// Classifies log lines into [`LogEvent`]s.
///
/// Matchers are tried in a fixed order and the first one whose pattern matches
/// decides the outcome, even when its captures turn out unusable.
pub struct LogParser {
    matchers: Vec<LineMatcher>,
}

impl LogParser {
    pub fn new() -> Self {
        let rules = vec![
            rule("Log file started", |_| Some(LogEvent::LogStarted)),
            rule(r#"(?:Loading|Started) map "(\S+)""#, |c| {
                Some(LogEvent::MapLoading {
                    map: cut_map_name(c.get(1)?.as_str()),
                })
            }),
            rule(r#"World triggered "Match_Start" on "(.+)""#, |c| {
                Some(LogEvent::MatchStart {
                    map: cut_map_name(c.get(1)?.as_str()),
                })
            }),
            rule(r#"World triggered "Round_Start""#, |_| {
                Some(LogEvent::RoundStart)
            }),
            rule(r#"Team "(\S)\S*" scored "(\d+)""#, |c| {
                let side = TeamSide::from_code(c.get(1)?.as_str().chars().next()?)?;
                let score = c.get(2)?.as_str().parse().ok()?;
                Some(LogEvent::TeamScored { side, score })
            }),
            rule(r#"World triggered "Round_End""#, |_| Some(LogEvent::RoundEnd)),
            rule("Game Over:", |_| Some(LogEvent::GameOver)),
            rule(format!("{} entered the game", PLAYER), |c| {
                Some(LogEvent::PlayerEntered {
                    name: c.get(1)?.as_str().to_string(),
                    steam_id: c.get(2)?.as_str().to_string(),
                })
            }),
            rule(format!(r"{} disconnected \(reason", PLAYER), |c| {
                Some(LogEvent::PlayerDisconnected {
                    steam_id: c.get(2)?.as_str().to_string(),
                })
            }),
            rule(
                format!(r"{} switched from team <[^>]*> to <([^>]+)>", PLAYER),
                |c| {
                    Some(LogEvent::TeamSwitch {
                        name: c.get(1)?.as_str().to_string(),
                        steam_id: c.get(2)?.as_str().to_string(),
                        team: Team::from_log_name(c.get(3)?.as_str()),
                    })
                },
            ),
            rule(format!(r"{} \[[^\]]*\] killed {}", COMBATANT, COMBATANT), |c| {
                let killer = c.get(2).map(|m| m.as_str().to_string());
                let victim = c.get(4).map(|m| m.as_str().to_string());
                if killer.is_none() && victim.is_none() {
                    return None;
                }
                Some(LogEvent::Kill { killer, victim })
            }),
            rule("Log file closed", |_| Some(LogEvent::LogClosed)),
        ];

        Self { matchers: rules }
    }

    /// Classify one line. Unknown, short or malformed lines yield `None`.
    pub fn parse(&self, line: &str) -> Option<LogEvent> {
        if line.len() < MIN_LINE_LEN {
            return None;
        }

        for matcher in &self.matchers {
            if let Some(captures) = matcher.pattern.captures(line) {
                let event = (matcher.extract)(&captures);
                if event.is_none() {
                    tracing::debug!("Malformed log line skipped: {}", line);
                }
                return event;
            }
        }

        None
    }
}

impl Default for LogParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Bare map name from the forms the server reports.
///
/// `workshop/123456/de_cache` becomes `de_cache` (the third word); a trailing
/// `.bsp` is dropped.
pub fn cut_map_name(raw: &str) -> String {
    let mut name = raw;

    if raw.contains("workshop") {
        if let Some(third) = WORD.find_iter(raw).nth(2) {
            name = third.as_str();
        }
    }

    name.strip_suffix(".bsp").unwrap_or(name).to_string()
}
