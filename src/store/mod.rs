mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::error::StoreResult;
use crate::types::{Lobby, Player};

/// What the store should do to the registered player entry if the owning
/// client's connection drops without an explicit leave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectEffect {
    /// Delete the player entry.
    RemovePlayer,
    /// Keep the entry but flip `connected` to false.
    MarkOffline,
}

/// The shared state store, as the core sees it: point reads, whole-record
/// and sub-path writes, deletes, snapshot subscription, and an
/// on-disconnect cleanup hook.
///
/// No transactions and no compare-and-set. Read-modify-write sequences from
/// different clients interleave freely, so everything built on top must be
/// idempotent or converge when applied against a stale snapshot.
#[async_trait]
pub trait LobbyStore: Send + Sync {
    async fn read(&self, code: &str) -> StoreResult<Option<Lobby>>;

    /// Whole-record write, creating or replacing the lobby.
    async fn write(&self, code: &str, lobby: &Lobby) -> StoreResult<()>;

    async fn remove(&self, code: &str) -> StoreResult<()>;

    /// Point write of `hostId`.
    async fn write_host(&self, code: &str, host: &str) -> StoreResult<()>;

    /// Point write of one player entry; overwrites an existing entry with
    /// the same id (rejoin).
    async fn write_player(&self, code: &str, player: &Player) -> StoreResult<()>;

    async fn remove_player(&self, code: &str, player: &str) -> StoreResult<()>;

    /// Point write of `votes[round][voter] = target`. Last write wins.
    async fn write_vote(
        &self,
        code: &str,
        round: u32,
        voter: &str,
        target: &str,
    ) -> StoreResult<()>;

    /// Push stream of full-record snapshots. `None` means the record does
    /// not currently exist.
    async fn subscribe(&self, code: &str) -> watch::Receiver<Option<Lobby>>;

    /// Register `effect` to run against the caller's player entry if the
    /// connection drops. Dropping the returned guard without cancelling is
    /// the in-process equivalent of the connection dying.
    async fn on_disconnect(
        &self,
        code: &str,
        player: &str,
        effect: DisconnectEffect,
    ) -> DisconnectGuard;
}

/// Handle for a registered disconnect hook. Fires the effect when dropped;
/// an explicit leave cancels it first. Leave is idempotent, so the hook and
/// an explicit cleanup both firing is harmless.
pub struct DisconnectGuard {
    effect: Option<Box<dyn FnOnce() + Send>>,
}

impl DisconnectGuard {
    pub fn new(effect: impl FnOnce() + Send + 'static) -> Self {
        Self {
            effect: Some(Box::new(effect)),
        }
    }

    /// A guard with no registered effect, for stores without the hook
    /// primitive.
    pub fn disarmed() -> Self {
        Self { effect: None }
    }

    pub fn cancel(mut self) {
        self.effect = None;
    }
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        if let Some(effect) = self.effect.take() {
            effect();
        }
    }
}
