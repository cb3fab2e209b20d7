use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::watch;

use crate::error::StoreResult;
use crate::types::{Lobby, Player};

use super::{DisconnectEffect, DisconnectGuard, LobbyStore};

/// In-process store with the same observable semantics as a networked one:
/// point writes, full-snapshot fanout to subscribers, best-effort
/// disconnect hooks, and no mutual exclusion between read-modify-write
/// sequences from different sessions.
#[derive(Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    lobbies: HashMap<String, Lobby>,
    watchers: HashMap<String, watch::Sender<Option<Lobby>>>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

// The lock is held for map access only, never across an await. It also has
// to be lockable from a synchronous Drop, which rules out the tokio one.
fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Inner {
    fn publish(&mut self, code: &str) {
        if let Some(tx) = self.watchers.get(code) {
            let _ = tx.send(self.lobbies.get(code).cloned());
        }
    }
}

#[async_trait]
impl LobbyStore for MemoryStore {
    async fn read(&self, code: &str) -> StoreResult<Option<Lobby>> {
        Ok(lock(&self.inner).lobbies.get(code).cloned())
    }

    async fn write(&self, code: &str, lobby: &Lobby) -> StoreResult<()> {
        let mut inner = lock(&self.inner);
        inner.lobbies.insert(code.to_string(), lobby.clone());
        inner.publish(code);
        Ok(())
    }

    async fn remove(&self, code: &str) -> StoreResult<()> {
        let mut inner = lock(&self.inner);
        inner.lobbies.remove(code);
        inner.publish(code);
        Ok(())
    }

    // Sub-path writes against a record that vanished mid-flight land on
    // nothing; the writer was acting on a stale snapshot.
    async fn write_host(&self, code: &str, host: &str) -> StoreResult<()> {
        let mut inner = lock(&self.inner);
        if let Some(lobby) = inner.lobbies.get_mut(code) {
            lobby.host_id = host.to_string();
            inner.publish(code);
        }
        Ok(())
    }

    async fn write_player(&self, code: &str, player: &Player) -> StoreResult<()> {
        let mut inner = lock(&self.inner);
        if let Some(lobby) = inner.lobbies.get_mut(code) {
            lobby.players.insert(player.id.clone(), player.clone());
            inner.publish(code);
        }
        Ok(())
    }

    async fn remove_player(&self, code: &str, player: &str) -> StoreResult<()> {
        let mut inner = lock(&self.inner);
        if let Some(lobby) = inner.lobbies.get_mut(code) {
            lobby.players.remove(player);
            inner.publish(code);
        }
        Ok(())
    }

    async fn write_vote(
        &self,
        code: &str,
        round: u32,
        voter: &str,
        target: &str,
    ) -> StoreResult<()> {
        let mut inner = lock(&self.inner);
        if let Some(lobby) = inner.lobbies.get_mut(code) {
            lobby
                .votes
                .entry(round)
                .or_default()
                .insert(voter.to_string(), target.to_string());
            inner.publish(code);
        }
        Ok(())
    }

    async fn subscribe(&self, code: &str) -> watch::Receiver<Option<Lobby>> {
        let mut inner = lock(&self.inner);
        let Inner { lobbies, watchers } = &mut *inner;
        let tx = match watchers.entry(code.to_string()) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => {
                let (tx, _rx) = watch::channel(lobbies.get(code).cloned());
                e.insert(tx)
            }
        };
        tx.subscribe()
    }

    async fn on_disconnect(
        &self,
        code: &str,
        player: &str,
        effect: DisconnectEffect,
    ) -> DisconnectGuard {
        let inner = Arc::clone(&self.inner);
        let code = code.to_string();
        let player = player.to_string();
        DisconnectGuard::new(move || {
            let mut inner = lock(&inner);
            match effect {
                DisconnectEffect::RemovePlayer => {
                    if let Some(lobby) = inner.lobbies.get_mut(&code) {
                        lobby.players.remove(&player);
                    }
                }
                DisconnectEffect::MarkOffline => {
                    if let Some(p) = inner
                        .lobbies
                        .get_mut(&code)
                        .and_then(|l| l.players.get_mut(&player))
                    {
                        p.connected = false;
                    }
                }
            }
            inner.publish(&code);
        })
    }
}
