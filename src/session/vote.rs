use std::collections::BTreeMap;

use super::Session;
use crate::error::{Error, Result};
use crate::types::{now_ms, Lobby, LobbyStatus, PlayerId, RoundResult, Winner};

impl Session {
    /// Record this player's vote for the current round and evaluate it.
    ///
    /// The write is a point write of `votes[round][voter]`; a replayed or
    /// changed vote simply overwrites (last write wins). Validation here is
    /// the caller-facing boundary only — nothing stops another client from
    /// writing an arbitrary vote into the store, so the tally re-filters.
    pub async fn cast_vote(&self, target: &str) -> Result<()> {
        let lobby = self.read_current().await?;
        if lobby.status != LobbyStatus::Playing {
            return Err(Error::InvalidState("votes can only be cast while playing"));
        }

        let voter = lobby
            .player(self.identity())
            .ok_or(Error::InvalidVote("voter is not in this lobby"))?;
        if voter.eliminated {
            return Err(Error::InvalidVote("eliminated players do not vote"));
        }
        if target == self.identity() {
            return Err(Error::InvalidVote("cannot vote for yourself"));
        }
        match lobby.player(target) {
            None => return Err(Error::InvalidVote("no such player")),
            Some(t) if t.eliminated => {
                return Err(Error::InvalidVote("target is already eliminated"))
            }
            Some(_) => {}
        }

        let code = self.require_code()?;
        self.store()
            .write_vote(code, lobby.round, self.identity(), target)
            .await?;
        tracing::debug!(
            "{} voted for {} in {} round {}",
            self.identity(),
            target,
            code,
            lobby.round
        );

        self.evaluate_round().await
    }

    /// Conclude the current round if a quorum has been reached, otherwise
    /// do nothing.
    ///
    /// Quorum is every non-eliminated player; eliminated players are out of
    /// the denominator and their stale votes are ignored. Runs on every
    /// vote cast and as a reconcile backstop, and any two clients
    /// evaluating the same snapshot write the same outcome, so a duplicate
    /// evaluation converges instead of double-applying.
    pub async fn evaluate_round(&self) -> Result<()> {
        let lobby = self.read_current().await?;
        if lobby.status != LobbyStatus::Playing {
            return Ok(());
        }

        let round = lobby.round;
        let cast = match lobby.current_votes() {
            Some(votes) => votes,
            None => return Ok(()),
        };
        if !lobby.alive_players().all(|p| cast.contains_key(&p.id)) {
            return Ok(());
        }

        let tally = tally_votes(&lobby);
        let top = tally.values().max().copied().unwrap_or(0);
        let leaders: Vec<&PlayerId> = tally
            .iter()
            .filter(|(_, count)| **count == top)
            .map(|(id, _)| id)
            .collect();

        let code = self.require_code()?;
        let mut next = lobby.clone();

        // No strict maximum: nobody is eliminated and the same round is
        // voted again from scratch. The round did not conclude, so no
        // result record is written.
        if leaders.len() != 1 {
            next.votes.remove(&round);
            self.store().write(code, &next).await?;
            tracing::info!("round {} in {} tied, voting reopened", round, code);
            return Ok(());
        }

        let eliminated_id = leaders[0].clone();
        if let Some(player) = next.players.get_mut(&eliminated_id) {
            player.eliminated = true;
        }

        let winner = decide_winner(&next);
        next.results.insert(
            round,
            RoundResult {
                tally,
                eliminated_id: Some(eliminated_id.clone()),
                winner,
                at: now_ms(),
            },
        );
        next.votes.clear();
        match winner {
            Winner::None => {
                next.round += 1;
                tracing::info!(
                    "{} eliminated in {} round {}, continuing",
                    eliminated_id,
                    code,
                    round
                );
            }
            _ => {
                next.status = LobbyStatus::Reveal;
                next.winner = winner;
                tracing::info!("game over in {}: {:?} win", code, winner);
            }
        }

        self.store().write(code, &next).await?;
        Ok(())
    }
}

/// Per-target counts over a map seeded with every living player at zero,
/// so the record shows who escaped votes entirely. Votes from players who
/// are gone or eliminated, or aimed at such players, are dropped.
fn tally_votes(lobby: &Lobby) -> BTreeMap<PlayerId, u32> {
    let mut tally: BTreeMap<PlayerId, u32> = lobby
        .alive_players()
        .map(|p| (p.id.clone(), 0))
        .collect();

    if let Some(cast) = lobby.current_votes() {
        for (voter, target) in cast {
            let voter_alive = lobby.player(voter).is_some_and(|p| !p.eliminated);
            if !voter_alive {
                continue;
            }
            if let Some(count) = tally.get_mut(target) {
                *count += 1;
            }
        }
    }
    tally
}

/// Citizens win the moment no impostor is left; impostors win on reaching
/// parity with the remaining citizens (one impostor and one citizen alive
/// already ends the game).
fn decide_winner(lobby: &Lobby) -> Winner {
    let impostors = lobby.impostors_alive();
    let citizens = lobby.citizens_alive();
    if impostors == 0 {
        Winner::Citizens
    } else if impostors >= citizens {
        Winner::Impostors
    } else {
        Winner::None
    }
}
