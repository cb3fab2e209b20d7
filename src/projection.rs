use serde::Serialize;
use std::collections::BTreeMap;

use crate::types::{Lobby, LobbyStatus, PlayerId, RoundResult, Settings, Winner};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlayerRole {
    Citizen,
    Impostor,
}

/// One row of the player list. Carries no role: other players' roles never
/// leave the projector, whatever the raw record holds.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerEntry {
    pub id: PlayerId,
    pub name: String,
    pub eliminated: bool,
    pub connected: bool,
    pub is_you: bool,
    pub has_voted: bool,
}

/// Display-ready slice of one lobby snapshot for one viewer: what they may
/// see and which actions are currently theirs to take.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LobbyView {
    pub you: PlayerId,
    pub status: LobbyStatus,
    pub round: u32,
    pub winner: Winner,
    pub settings: Settings,
    /// The viewer's own role, only while playing or revealing.
    pub role: Option<PlayerRole>,
    /// The secret word, absent for impostors and outside play.
    pub word: Option<String>,
    /// The hint is deliberately not secret.
    pub hint: Option<String>,
    /// Everyone in the lobby, join order.
    pub players: Vec<PlayerEntry>,
    /// Who the viewer may currently vote for.
    pub vote_options: Vec<PlayerId>,
    pub can_vote: bool,
    /// Current-round ballots, public by design: (voter, target).
    pub votes_cast: Vec<(PlayerId, PlayerId)>,
    pub can_start_game: bool,
    pub can_close_lobby: bool,
    pub can_update_settings: bool,
    pub can_submit_word: bool,
    /// Concluded rounds, oldest first.
    pub results: BTreeMap<u32, RoundResult>,
}

/// Pure function of (snapshot, viewer identity); holds every rule about
/// what a given player is allowed to see. A misbehaving client can still
/// read the raw record off the store — that trust gap lives outside this
/// function.
pub fn project(lobby: &Lobby, viewer: &PlayerId) -> LobbyView {
    let me = lobby.player(viewer);
    let in_play = matches!(lobby.status, LobbyStatus::Playing | LobbyStatus::Reveal);
    let is_host = lobby.is_host(viewer);
    let between_games = matches!(lobby.status, LobbyStatus::Lobby | LobbyStatus::Reveal);

    let role = match me {
        Some(p) if in_play => Some(if p.is_impostor {
            PlayerRole::Impostor
        } else {
            PlayerRole::Citizen
        }),
        _ => None,
    };

    // Fail closed: a viewer without a player entry sees neither role nor
    // word.
    let word = match me {
        Some(p) if in_play && !p.is_impostor && !lobby.word.is_empty() => {
            Some(lobby.word.clone())
        }
        _ => None,
    };
    let hint = if in_play { lobby.hint.clone() } else { None };

    let empty = BTreeMap::new();
    let cast = lobby.current_votes().unwrap_or(&empty);

    let mut ordered: Vec<_> = lobby.players.values().collect();
    ordered.sort_by(|a, b| (a.joined_at, &a.id).cmp(&(b.joined_at, &b.id)));

    let players = ordered
        .iter()
        .map(|p| PlayerEntry {
            id: p.id.clone(),
            name: p.name.clone(),
            eliminated: p.eliminated,
            connected: p.connected,
            is_you: &p.id == viewer,
            has_voted: cast.contains_key(&p.id),
        })
        .collect();

    let voting_open = lobby.status == LobbyStatus::Playing;
    let vote_options: Vec<PlayerId> = if voting_open {
        ordered
            .iter()
            .filter(|p| !p.eliminated && &p.id != viewer)
            .map(|p| p.id.clone())
            .collect()
    } else {
        Vec::new()
    };
    let can_vote = voting_open
        && me.is_some_and(|p| !p.eliminated)
        && !cast.contains_key(viewer);

    let votes_cast = cast
        .iter()
        .map(|(voter, target)| (voter.clone(), target.clone()))
        .collect();

    LobbyView {
        you: viewer.clone(),
        status: lobby.status,
        round: lobby.round,
        winner: lobby.winner,
        settings: lobby.settings.clone(),
        role,
        word,
        hint,
        players,
        vote_options,
        can_vote,
        votes_cast,
        can_start_game: is_host && between_games,
        can_close_lobby: is_host,
        can_update_settings: is_host && between_games,
        can_submit_word: lobby.status == LobbyStatus::ChoosingWord
            && lobby.word_chooser.as_ref() == Some(viewer),
        results: lobby.results.clone(),
    }
}
