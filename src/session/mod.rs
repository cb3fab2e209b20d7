mod game;
mod lobby;
mod vote;

use std::sync::Arc;

use tokio::sync::watch;

use crate::error::{Error, Result};
use crate::projection::{self, LobbyView};
use crate::store::{DisconnectGuard, LobbyStore};
use crate::types::{Lobby, LobbyCode, LobbyStatus, PlayerId};

/// Join-code alphabet: 4 uppercase alphanumerics, short enough to read off
/// someone else's screen.
pub(crate) const CODE_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
pub(crate) const CODE_LENGTH: usize = 4;

/// Mint a stable anonymous identity for one client session.
pub fn mint_identity() -> PlayerId {
    ulid::Ulid::new().to_string()
}

/// One client's handle on the shared lobby state: an identity, a store
/// connection, and at most one lobby membership at a time.
///
/// Every operation is a read-then-write against the store with no lock in
/// between; a concurrent writer can always slip in. Operations are shaped
/// so that replaying them, or applying them from a slightly stale snapshot,
/// converges rather than corrupts.
pub struct Session {
    store: Arc<dyn LobbyStore>,
    identity: PlayerId,
    code: Option<LobbyCode>,
    guard: Option<DisconnectGuard>,
}

impl Session {
    pub fn new(store: Arc<dyn LobbyStore>, identity: PlayerId) -> Self {
        Self {
            store,
            identity,
            code: None,
            guard: None,
        }
    }

    pub fn identity(&self) -> &PlayerId {
        &self.identity
    }

    /// Code of the lobby this session is currently in, if any.
    pub fn code(&self) -> Option<&LobbyCode> {
        self.code.as_ref()
    }

    /// Push stream of full-record snapshots for the current lobby. `None`
    /// snapshots mean the record was deleted out from under us.
    pub async fn snapshots(&self) -> Result<watch::Receiver<Option<Lobby>>> {
        let code = self.require_code()?;
        Ok(self.store.subscribe(code).await)
    }

    /// What this player is allowed to see of `lobby`.
    pub fn view(&self, lobby: &Lobby) -> LobbyView {
        projection::project(lobby, &self.identity)
    }

    /// Convergent self-repair, run against each pushed snapshot.
    ///
    /// The store's disconnect hook can only touch the registered player
    /// sub-path, so a vanished client can leave a dangling `hostId` or
    /// `wordChooser`, an emptied record, or a quorum nobody re-evaluates.
    /// Only the senior surviving player writes, and every pick is a
    /// deterministic function of the snapshot, so concurrent repairers
    /// produce identical writes.
    pub async fn reconcile(&self, lobby: &Lobby) -> Result<()> {
        let code = self.require_code()?.clone();

        if lobby.players.is_empty() {
            tracing::info!("lobby {} emptied by disconnect, removing", code);
            self.store.remove(&code).await?;
            return Ok(());
        }

        let senior = match lobby.senior_player() {
            Some(p) => p.id.clone(),
            None => return Ok(()),
        };
        if senior != self.identity {
            return Ok(());
        }

        self.repair_departures(&code, lobby).await?;

        // A voter that cast the final vote and vanished before evaluating
        // leaves a complete round behind; finish it.
        if lobby.status == LobbyStatus::Playing {
            self.evaluate_round().await?;
        }
        Ok(())
    }

    /// Re-point `hostId` (and, while choosing, `wordChooser`) at the senior
    /// remaining player when the referenced player is gone. Deletes the
    /// record instead when no player remains.
    pub(crate) async fn repair_departures(&self, code: &str, lobby: &Lobby) -> Result<()> {
        if lobby.players.is_empty() {
            tracing::info!("last player left {}, removing lobby", code);
            self.store.remove(code).await?;
            return Ok(());
        }

        let senior = match lobby.senior_player() {
            Some(p) => p.id.clone(),
            None => return Ok(()),
        };

        let host_gone = !lobby.players.contains_key(&lobby.host_id);
        let chooser_gone = lobby.status == LobbyStatus::ChoosingWord
            && lobby
                .word_chooser
                .as_ref()
                .is_some_and(|c| !lobby.players.contains_key(c));

        if chooser_gone {
            let mut repaired = lobby.clone();
            repaired.word_chooser = Some(senior.clone());
            if host_gone {
                repaired.host_id = senior.clone();
            }
            tracing::info!("word chooser left {}, reassigned to {}", code, senior);
            self.store.write(code, &repaired).await?;
        } else if host_gone {
            tracing::info!("host left {}, promoting {}", code, senior);
            self.store.write_host(code, &senior).await?;
        }
        Ok(())
    }

    pub(crate) fn require_code(&self) -> Result<&LobbyCode> {
        self.code.as_ref().ok_or(Error::NotInLobby)
    }

    pub(crate) async fn read_current(&self) -> Result<Lobby> {
        let code = self.require_code()?;
        self.store
            .read(code)
            .await?
            .ok_or_else(|| Error::NotFound(code.clone()))
    }

    pub(crate) fn store(&self) -> &dyn LobbyStore {
        self.store.as_ref()
    }

    /// Bind this session to a lobby, replacing any previous binding.
    pub(crate) fn attach(&mut self, code: LobbyCode, guard: DisconnectGuard) {
        if let Some(old) = self.guard.take() {
            old.cancel();
        }
        self.code = Some(code);
        self.guard = Some(guard);
    }

    pub(crate) fn detach(&mut self) {
        if let Some(guard) = self.guard.take() {
            guard.cancel();
        }
        self.code = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::Player;

    pub(crate) fn test_session(store: &Arc<MemoryStore>) -> Session {
        Session::new(store.clone(), mint_identity())
    }

    #[test]
    fn test_mint_identity_is_unique() {
        assert_ne!(mint_identity(), mint_identity());
    }

    #[tokio::test]
    async fn test_operations_require_membership() {
        let store = MemoryStore::new();
        let session = test_session(&store);

        assert!(matches!(session.read_current().await, Err(Error::NotInLobby)));
        assert!(matches!(session.snapshots().await, Err(Error::NotInLobby)));
    }

    #[tokio::test]
    async fn test_reconcile_promotes_senior_after_host_vanishes() {
        let store = MemoryStore::new();
        let mut session = test_session(&store);

        // Record whose host entry was already reaped by the store hook.
        let mut lobby = Lobby::new(Player::new(session.identity().clone(), "Ana".into(), 5));
        lobby.host_id = "ghost".into();
        store.write("AB12", &lobby).await.unwrap();
        session.attach("AB12".into(), DisconnectGuard::disarmed());

        let snapshot = store.read("AB12").await.unwrap().unwrap();
        session.reconcile(&snapshot).await.unwrap();

        let repaired = store.read("AB12").await.unwrap().unwrap();
        assert_eq!(&repaired.host_id, session.identity());
    }

    #[tokio::test]
    async fn test_reconcile_only_senior_writes() {
        let store = MemoryStore::new();
        let mut session = test_session(&store);

        let mut lobby = Lobby::new(Player::new(session.identity().clone(), "Ana".into(), 9));
        lobby
            .players
            .insert("a0".into(), Player::new("a0".into(), "Ben".into(), 1));
        lobby.host_id = "ghost".into();
        store.write("AB12", &lobby).await.unwrap();
        session.attach("AB12".into(), DisconnectGuard::disarmed());

        let snapshot = store.read("AB12").await.unwrap().unwrap();
        session.reconcile(&snapshot).await.unwrap();

        // "a0" joined earlier, so this session must leave the repair to it.
        let untouched = store.read("AB12").await.unwrap().unwrap();
        assert_eq!(untouched.host_id, "ghost");
    }

    #[tokio::test]
    async fn test_reconcile_reassigns_vanished_chooser() {
        let store = MemoryStore::new();
        let mut session = test_session(&store);

        let mut lobby = Lobby::new(Player::new(session.identity().clone(), "Ana".into(), 5));
        lobby.status = LobbyStatus::ChoosingWord;
        lobby.word_chooser = Some("ghost".into());
        store.write("AB12", &lobby).await.unwrap();
        session.attach("AB12".into(), DisconnectGuard::disarmed());

        let snapshot = store.read("AB12").await.unwrap().unwrap();
        session.reconcile(&snapshot).await.unwrap();

        let repaired = store.read("AB12").await.unwrap().unwrap();
        assert_eq!(repaired.word_chooser.as_ref(), Some(session.identity()));
    }

    #[tokio::test]
    async fn test_reconcile_removes_emptied_record() {
        let store = MemoryStore::new();
        let mut session = test_session(&store);

        let mut lobby = Lobby::new(Player::new("ghost".into(), "Ana".into(), 1));
        lobby.players.clear();
        store.write("AB12", &lobby).await.unwrap();
        session.attach("AB12".into(), DisconnectGuard::disarmed());

        let snapshot = store.read("AB12").await.unwrap().unwrap();
        session.reconcile(&snapshot).await.unwrap();

        assert_eq!(store.read("AB12").await.unwrap(), None);
    }
}
