use rand::Rng;

use super::{Session, CODE_CHARS, CODE_LENGTH};
use crate::error::{Error, Result};
use crate::store::DisconnectEffect;
use crate::types::{now_ms, Lobby, LobbyCode, LobbyStatus, Player, SettingsPatch};

/// How many collisions to tolerate before giving up on code generation.
const MAX_CREATE_ATTEMPTS: u32 = 32;
const MAX_NAME_CHARS: usize = 32;

fn random_code() -> LobbyCode {
    let mut rng = rand::rng();
    (0..CODE_LENGTH)
        .map(|_| CODE_CHARS[rng.random_range(0..CODE_CHARS.len())] as char)
        .collect()
}

/// Codes are typed by hand; trim and uppercase before rejecting.
fn normalize_code(input: &str) -> Result<LobbyCode> {
    let code: String = input.trim().to_ascii_uppercase();
    if code.len() != CODE_LENGTH || !code.bytes().all(|b| CODE_CHARS.contains(&b)) {
        return Err(Error::InvalidCode(input.to_string()));
    }
    Ok(code)
}

fn clean_name(input: &str) -> Result<String> {
    let name = input.trim();
    if name.is_empty() || name.chars().count() > MAX_NAME_CHARS {
        return Err(Error::InvalidName(MAX_NAME_CHARS));
    }
    Ok(name.to_string())
}

impl Session {
    /// Open a fresh lobby and become its host and sole player.
    ///
    /// There is no create-if-absent primitive, so a concurrent creator can
    /// slip between the existence check and the write; over a 4-character
    /// code space that collision is accepted rather than prevented.
    pub async fn create_lobby(&mut self, name: &str) -> Result<LobbyCode> {
        let name = clean_name(name)?;

        for attempt in 1..=MAX_CREATE_ATTEMPTS {
            let code = random_code();
            if self.store().read(&code).await?.is_some() {
                tracing::debug!("join code {} taken (attempt {})", code, attempt);
                continue;
            }

            let player = Player::new(self.identity().clone(), name.clone(), now_ms());
            let lobby = Lobby::new(player);
            self.store().write(&code, &lobby).await?;
            let guard = self
                .store()
                .on_disconnect(&code, self.identity(), DisconnectEffect::RemovePlayer)
                .await;

            tracing::info!("created lobby {} as {}", code, self.identity());
            self.attach(code.clone(), guard);
            return Ok(code);
        }

        Err(Error::CodesExhausted {
            attempts: MAX_CREATE_ATTEMPTS,
        })
    }

    /// Join an existing lobby that has not started playing. Rejoining with
    /// the same identity overwrites the old player entry.
    pub async fn join_lobby(&mut self, code: &str, name: &str) -> Result<()> {
        let code = normalize_code(code)?;
        let name = clean_name(name)?;

        let lobby = self
            .store()
            .read(&code)
            .await?
            .ok_or_else(|| Error::NotFound(code.clone()))?;
        if lobby.status != LobbyStatus::Lobby {
            return Err(Error::InvalidState("cannot join a game in progress"));
        }

        let player = Player::new(self.identity().clone(), name, now_ms());
        self.store().write_player(&code, &player).await?;
        let guard = self
            .store()
            .on_disconnect(&code, self.identity(), DisconnectEffect::RemovePlayer)
            .await;

        tracing::info!("{} joined lobby {}", self.identity(), code);
        self.attach(code, guard);
        Ok(())
    }

    /// Remove this player from the current lobby, deleting the record when
    /// it empties and re-pointing `hostId`/`wordChooser` otherwise. A
    /// second leave, or a leave racing the disconnect hook, is a no-op.
    pub async fn leave_lobby(&mut self) -> Result<()> {
        let code = match self.code() {
            Some(code) => code.clone(),
            None => return Ok(()),
        };

        self.store().remove_player(&code, self.identity()).await?;
        self.detach();
        tracing::info!("{} left lobby {}", self.identity(), code);

        // Repair what this snapshot shows; anything staler is another
        // client's snapshot to repair.
        if let Some(lobby) = self.store().read(&code).await? {
            self.repair_departures(&code, &lobby).await?;
        }
        Ok(())
    }

    /// Delete the lobby outright, evicting everyone. Host only.
    pub async fn close_lobby(&mut self) -> Result<()> {
        let lobby = self.read_current().await?;
        if !lobby.is_host(self.identity()) {
            return Err(Error::NotHost("close the lobby"));
        }

        let code = self.require_code()?.clone();
        self.store().remove(&code).await?;
        tracing::info!("host closed lobby {}", code);
        self.detach();
        Ok(())
    }

    /// Apply a partial settings update. Host only, and only between games.
    pub async fn update_settings(&self, patch: SettingsPatch) -> Result<()> {
        let mut lobby = self.read_current().await?;
        if !lobby.is_host(self.identity()) {
            return Err(Error::NotHost("change settings"));
        }
        if !matches!(lobby.status, LobbyStatus::Lobby | LobbyStatus::Reveal) {
            return Err(Error::InvalidState("settings are locked during a game"));
        }

        if let Some(count) = patch.impostor_count {
            if count == 0 {
                return Err(Error::InvalidSettings("impostorCount must be at least 1"));
            }
            lobby.settings.impostor_count = count;
        }
        if let Some(use_hint) = patch.use_hint {
            lobby.settings.use_hint = use_hint;
        }

        let code = self.require_code()?;
        self.store().write(code, &lobby).await?;
        Ok(())
    }
}
