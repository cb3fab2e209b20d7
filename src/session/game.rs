use std::collections::HashSet;

use rand::seq::{IndexedRandom, SliceRandom};

use super::Session;
use crate::error::{Error, Result};
use crate::types::{LobbyStatus, PlayerId, Winner};

/// Stored in place of a hint the chooser declined to write, so the field
/// reads as deliberately absent rather than broken.
const HINT_PLACEHOLDER: &str = "(no hint)";

/// Below this the game is playable but degenerate.
const RECOMMENDED_PLAYERS: usize = 3;

impl Session {
    /// Begin a new game cycle: pick a word chooser at random and reset all
    /// per-game state, reinstating eliminated players. Host only, from the
    /// lobby or from a concluded reveal.
    pub async fn host_start_game(&self) -> Result<()> {
        let mut lobby = self.read_current().await?;
        if !lobby.is_host(self.identity()) {
            return Err(Error::NotHost("start the game"));
        }
        if !matches!(lobby.status, LobbyStatus::Lobby | LobbyStatus::Reveal) {
            return Err(Error::InvalidState("a game is already underway"));
        }

        let code = self.require_code()?;
        if lobby.players.len() < RECOMMENDED_PLAYERS {
            tracing::warn!(
                "starting {} with only {} players",
                code,
                lobby.players.len()
            );
        }

        // Everyone is a candidate, eliminated or not: a fresh game
        // reinstates the whole lobby.
        let ids: Vec<&PlayerId> = lobby.players.keys().collect();
        let chooser = match ids.choose(&mut rand::rng()) {
            Some(id) => (*id).clone(),
            None => return Err(Error::InvalidState("lobby has no players")),
        };

        lobby.status = LobbyStatus::ChoosingWord;
        lobby.word_chooser = Some(chooser.clone());
        lobby.word.clear();
        lobby.hint = None;
        lobby.round = 0;
        lobby.winner = Winner::None;
        lobby.votes.clear();
        lobby.results.clear();
        for player in lobby.players.values_mut() {
            player.is_impostor = false;
            player.eliminated = false;
        }

        self.store().write(code, &lobby).await?;
        tracing::info!("game starting in {}, {} picks the word", code, chooser);
        Ok(())
    }

    /// Set the secret word and deal roles. Chooser only.
    ///
    /// Impostor candidates are everyone except the chooser, which is what
    /// keeps the one player who knows the word out of the impostor pool.
    pub async fn submit_word(&self, word: &str, hint: Option<&str>) -> Result<()> {
        let mut lobby = self.read_current().await?;
        if lobby.status != LobbyStatus::ChoosingWord {
            return Err(Error::InvalidState("the word is not being chosen"));
        }
        if lobby.word_chooser.as_ref() != Some(self.identity()) {
            return Err(Error::NotChooser);
        }

        let word = word.trim();
        if word.is_empty() {
            return Err(Error::EmptyWord);
        }

        let mut candidates: Vec<PlayerId> = lobby
            .players
            .keys()
            .filter(|id| *id != self.identity())
            .cloned()
            .collect();
        if candidates.is_empty() {
            return Err(Error::InvalidState("no other players to assign roles to"));
        }

        let count = lobby
            .settings
            .impostor_count
            .clamp(1, candidates.len() as u32) as usize;
        candidates.shuffle(&mut rand::rng());
        let impostors: HashSet<PlayerId> = candidates.into_iter().take(count).collect();
        for player in lobby.players.values_mut() {
            player.is_impostor = impostors.contains(&player.id);
        }

        lobby.hint = if lobby.settings.use_hint {
            let hint = hint.map(str::trim).filter(|h| !h.is_empty());
            Some(hint.unwrap_or(HINT_PLACEHOLDER).to_string())
        } else {
            None
        };
        lobby.word = word.to_string();
        lobby.status = LobbyStatus::Playing;
        lobby.round = 1;
        lobby.winner = Winner::None;
        lobby.votes.clear();
        lobby.results.clear();

        let code = self.require_code()?;
        self.store().write(code, &lobby).await?;
        tracing::info!(
            "round 1 in {}: {} impostor(s) among {} players",
            code,
            count,
            lobby.players.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::test_session;
    use super::*;
    use crate::session::Session;
    use crate::store::{LobbyStore, MemoryStore};
    use crate::types::{Lobby, RoundResult, SettingsPatch, Winner};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    async fn lobby_of(n: usize, store: &Arc<MemoryStore>) -> (Vec<Session>, String) {
        let mut host = test_session(store);
        let code = host.create_lobby("Ana").await.unwrap();
        let mut sessions = vec![host];
        for i in 1..n {
            let mut s = test_session(store);
            s.join_lobby(&code, &format!("Player{}", i)).await.unwrap();
            sessions.push(s);
        }
        (sessions, code)
    }

    fn chooser_index(sessions: &[Session], lobby: &Lobby) -> usize {
        let chooser = lobby.word_chooser.as_ref().unwrap();
        sessions
            .iter()
            .position(|s| s.identity() == chooser)
            .unwrap()
    }

    #[tokio::test]
    async fn test_start_game_requires_host() {
        let store = MemoryStore::new();
        let (sessions, _code) = lobby_of(2, &store).await;

        assert!(matches!(
            sessions[1].host_start_game().await,
            Err(Error::NotHost(_))
        ));
    }

    #[tokio::test]
    async fn test_start_game_requires_lobby_or_reveal() {
        let store = MemoryStore::new();
        let (sessions, code) = lobby_of(2, &store).await;

        let mut lobby = store.read(&code).await.unwrap().unwrap();
        lobby.status = LobbyStatus::Playing;
        store.write(&code, &lobby).await.unwrap();

        assert!(matches!(
            sessions[0].host_start_game().await,
            Err(Error::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_start_game_resets_everything() {
        let store = MemoryStore::new();
        let (sessions, code) = lobby_of(3, &store).await;

        // Leftovers from a previous cycle.
        let mut lobby = store.read(&code).await.unwrap().unwrap();
        lobby.status = LobbyStatus::Reveal;
        lobby.word = "guitar".into();
        lobby.hint = Some("strings".into());
        lobby.round = 4;
        lobby.winner = Winner::Citizens;
        lobby
            .votes
            .entry(4)
            .or_default()
            .insert("a".into(), "b".into());
        lobby.results.insert(
            4,
            RoundResult {
                tally: BTreeMap::new(),
                eliminated_id: None,
                winner: Winner::Citizens,
                at: 0,
            },
        );
        for p in lobby.players.values_mut() {
            p.is_impostor = true;
            p.eliminated = true;
        }
        store.write(&code, &lobby).await.unwrap();

        sessions[0].host_start_game().await.unwrap();

        let lobby = store.read(&code).await.unwrap().unwrap();
        assert_eq!(lobby.status, LobbyStatus::ChoosingWord);
        assert_eq!(lobby.round, 0);
        assert_eq!(lobby.word, "");
        assert_eq!(lobby.hint, None);
        assert_eq!(lobby.winner, Winner::None);
        assert!(lobby.votes.is_empty());
        assert!(lobby.results.is_empty());
        let chooser = lobby.word_chooser.clone().unwrap();
        assert!(lobby.players.contains_key(&chooser));
        assert!(lobby
            .players
            .values()
            .all(|p| !p.is_impostor && !p.eliminated));
    }

    #[tokio::test]
    async fn test_submit_word_deals_exactly_one_impostor() {
        let store = MemoryStore::new();
        let (sessions, code) = lobby_of(3, &store).await;
        sessions[0].host_start_game().await.unwrap();

        let lobby = store.read(&code).await.unwrap().unwrap();
        let chooser = chooser_index(&sessions, &lobby);
        sessions[chooser].submit_word("guitar", None).await.unwrap();

        let lobby = store.read(&code).await.unwrap().unwrap();
        assert_eq!(lobby.status, LobbyStatus::Playing);
        assert_eq!(lobby.round, 1);
        assert_eq!(lobby.word, "guitar");

        let impostors: Vec<_> = lobby
            .players
            .values()
            .filter(|p| p.is_impostor)
            .collect();
        assert_eq!(impostors.len(), 1);
        assert_ne!(impostors[0].id, *sessions[chooser].identity());
    }

    #[tokio::test]
    async fn test_submit_word_rejected_for_non_chooser() {
        let store = MemoryStore::new();
        let (sessions, code) = lobby_of(3, &store).await;
        sessions[0].host_start_game().await.unwrap();

        let lobby = store.read(&code).await.unwrap().unwrap();
        let chooser = chooser_index(&sessions, &lobby);
        let other = (chooser + 1) % sessions.len();

        assert!(matches!(
            sessions[other].submit_word("guitar", None).await,
            Err(Error::NotChooser)
        ));
    }

    #[tokio::test]
    async fn test_submit_word_rejects_blank_word() {
        let store = MemoryStore::new();
        let (sessions, code) = lobby_of(2, &store).await;
        sessions[0].host_start_game().await.unwrap();

        let lobby = store.read(&code).await.unwrap().unwrap();
        let chooser = chooser_index(&sessions, &lobby);

        assert!(matches!(
            sessions[chooser].submit_word("   ", None).await,
            Err(Error::EmptyWord)
        ));
    }

    #[tokio::test]
    async fn test_submit_word_needs_other_players() {
        let store = MemoryStore::new();
        let (sessions, _code) = lobby_of(1, &store).await;
        sessions[0].host_start_game().await.unwrap();

        assert!(matches!(
            sessions[0].submit_word("guitar", None).await,
            Err(Error::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_impostor_count_clamped_to_candidates() {
        let store = MemoryStore::new();
        let (sessions, code) = lobby_of(3, &store).await;
        sessions[0]
            .update_settings(SettingsPatch {
                impostor_count: Some(10),
                ..Default::default()
            })
            .await
            .unwrap();
        sessions[0].host_start_game().await.unwrap();

        let lobby = store.read(&code).await.unwrap().unwrap();
        let chooser = chooser_index(&sessions, &lobby);
        sessions[chooser].submit_word("guitar", None).await.unwrap();

        let lobby = store.read(&code).await.unwrap().unwrap();
        // Two candidates besides the chooser, both dealt impostor.
        assert_eq!(lobby.players.values().filter(|p| p.is_impostor).count(), 2);
        assert!(!lobby.players[sessions[chooser].identity()].is_impostor);
    }

    #[tokio::test]
    async fn test_hint_behavior() {
        let store = MemoryStore::new();
        let (sessions, code) = lobby_of(2, &store).await;

        // Hints disabled: a provided hint is dropped.
        sessions[0].host_start_game().await.unwrap();
        let lobby = store.read(&code).await.unwrap().unwrap();
        let chooser = chooser_index(&sessions, &lobby);
        sessions[chooser]
            .submit_word("guitar", Some("strings"))
            .await
            .unwrap();
        let lobby = store.read(&code).await.unwrap().unwrap();
        assert_eq!(lobby.hint, None);

        // Hints enabled: kept, and an empty one becomes the placeholder.
        let mut lobby = store.read(&code).await.unwrap().unwrap();
        lobby.status = LobbyStatus::Reveal;
        store.write(&code, &lobby).await.unwrap();
        sessions[0]
            .update_settings(SettingsPatch {
                use_hint: Some(true),
                ..Default::default()
            })
            .await
            .unwrap();
        sessions[0].host_start_game().await.unwrap();
        let lobby = store.read(&code).await.unwrap().unwrap();
        let chooser = chooser_index(&sessions, &lobby);
        sessions[chooser]
            .submit_word("guitar", Some("  "))
            .await
            .unwrap();
        let lobby = store.read(&code).await.unwrap().unwrap();
        assert_eq!(lobby.hint.as_deref(), Some(HINT_PLACEHOLDER));
    }
}
