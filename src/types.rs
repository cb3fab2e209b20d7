use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Opaque ID types for type safety
pub type PlayerId = String;
pub type LobbyCode = String;

/// Votes for one round: voter -> target.
pub type RoundVotes = BTreeMap<PlayerId, PlayerId>;

/// Epoch milliseconds, the timestamp format the store schema persists.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum LobbyStatus {
    Lobby,
    ChoosingWord,
    Playing,
    Reveal,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Winner {
    #[default]
    None,
    Citizens,
    Impostors,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// How many impostors to assign, clamped against the player count when
    /// roles are dealt.
    pub impostor_count: u32,
    pub use_hint: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            impostor_count: 1,
            use_hint: false,
        }
    }
}

/// Partial settings update; absent fields keep their current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    pub impostor_count: Option<u32>,
    pub use_hint: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub is_impostor: bool,
    pub joined_at: i64,
    #[serde(default)]
    pub eliminated: bool,
    #[serde(default = "default_connected")]
    pub connected: bool,
}

fn default_connected() -> bool {
    true
}

impl Player {
    pub fn new(id: PlayerId, name: String, joined_at: i64) -> Self {
        Self {
            id,
            name,
            is_impostor: false,
            joined_at,
            eliminated: false,
            connected: true,
        }
    }
}

/// Outcome of one concluded round. Append-only, keyed by round number.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoundResult {
    pub tally: BTreeMap<PlayerId, u32>,
    pub eliminated_id: Option<PlayerId>,
    pub winner: Winner,
    pub at: i64,
}

/// The shared record for one game session, keyed by a short join code.
///
/// Every field is writable by any client holding a player entry; there is
/// no server-side enforcement behind the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Lobby {
    pub host_id: PlayerId,
    pub created_at: i64,
    pub status: LobbyStatus,
    pub round: u32,
    #[serde(default)]
    pub word: String,
    #[serde(default)]
    pub hint: Option<String>,
    #[serde(default)]
    pub word_chooser: Option<PlayerId>,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub winner: Winner,
    pub players: BTreeMap<PlayerId, Player>,
    #[serde(default)]
    pub votes: BTreeMap<u32, RoundVotes>,
    #[serde(default)]
    pub results: BTreeMap<u32, RoundResult>,
}

impl Lobby {
    /// Fresh lobby with `host` as sole player and host, default settings.
    pub fn new(host: Player) -> Self {
        let host_id = host.id.clone();
        let mut players = BTreeMap::new();
        players.insert(host_id.clone(), host);
        Self {
            host_id,
            created_at: now_ms(),
            status: LobbyStatus::Lobby,
            round: 0,
            word: String::new(),
            hint: None,
            word_chooser: None,
            settings: Settings::default(),
            winner: Winner::None,
            players,
            votes: BTreeMap::new(),
            results: BTreeMap::new(),
        }
    }

    pub fn player(&self, id: &str) -> Option<&Player> {
        self.players.get(id)
    }

    pub fn is_host(&self, id: &str) -> bool {
        self.host_id == id
    }

    /// Votes recorded for the current round, if any.
    pub fn current_votes(&self) -> Option<&RoundVotes> {
        self.votes.get(&self.round)
    }

    /// Players still in the game.
    pub fn alive_players(&self) -> impl Iterator<Item = &Player> {
        self.players.values().filter(|p| !p.eliminated)
    }

    pub fn impostors_alive(&self) -> usize {
        self.alive_players().filter(|p| p.is_impostor).count()
    }

    pub fn citizens_alive(&self) -> usize {
        self.alive_players().filter(|p| !p.is_impostor).count()
    }

    /// Present player with the earliest join time, ties broken by id so
    /// every client resolves to the same answer from the same snapshot.
    pub fn senior_player(&self) -> Option<&Player> {
        self.players.values().min_by_key(|p| (p.joined_at, &p.id))
    }
}
