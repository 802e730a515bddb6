// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session lifecycle coordination.
//!
//! The store row and the agent's on-disk session file are created by two
//! different actors and are not transactional: the manager inserts the row
//! first, then runs the bootstrap ping, and rolls the row back if the ping
//! fails. Deletion mirrors this by removing the row and, when asked, the
//! agent's file.

use crate::bootstrap::SessionBootstrap;
use crate::config::IrisConfig;
use iris_core::{
    session_file_path, validate_team_name, Clock, IrisError, Session, SessionStatus,
};
use iris_store::{SessionFilter, SessionStore};
use std::sync::Arc;
use std::time::Duration;

/// `fromTeam` used for sessions initiated outside any configured team.
pub const EXTERNAL_FROM: &str = "external";

pub struct SessionManager<C: Clock> {
    config: Arc<IrisConfig>,
    store: Arc<SessionStore>,
    bootstrap: Arc<dyn SessionBootstrap>,
    clock: C,
}

impl<C: Clock> SessionManager<C> {
    pub fn new(
        config: Arc<IrisConfig>,
        store: Arc<SessionStore>,
        bootstrap: Arc<dyn SessionBootstrap>,
        clock: C,
    ) -> Self {
        Self { config, store, bootstrap, clock }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Ensure an `(external, team)` session exists for every configured
    /// team, reusing rows that survived a restart.
    pub async fn initialize(&self) -> Result<(), IrisError> {
        let teams: Vec<String> = self.config.teams.keys().cloned().collect();
        for team in teams {
            let session = self.get_or_create_session(EXTERNAL_FROM, &team).await?;
            tracing::debug!(team, session_id = %session.session_id, "session ready");
        }
        Ok(())
    }

    /// Return the live session for the pair, creating one (row + agent
    /// file) if none exists.
    pub async fn get_or_create_session(
        &self,
        from_team: &str,
        to_team: &str,
    ) -> Result<Session, IrisError> {
        validate_team_name(from_team).map_err(|_| {
            IrisError::validation("fromTeam", format!("invalid team name {from_team:?}"))
        })?;
        validate_team_name(to_team)?;
        let team = self
            .config
            .team(to_team)
            .ok_or_else(|| IrisError::TeamNotFound(to_team.to_string()))?
            .clone();

        if let Some(session) = self.store.get_by_team_pair(from_team, to_team)? {
            return Ok(session);
        }

        let session_id = iris_core::new_session_id();
        let session = self.store.create(from_team, to_team, &session_id, self.clock.epoch_ms())?;
        tracing::info!(from_team, to_team, %session_id, "created session");

        let timeout = Duration::from_millis(self.config.session_init_timeout(&team));
        if let Err(e) =
            self.bootstrap.create_session_file(to_team, &team, &session_id, timeout).await
        {
            // The row must not outlive a failed file creation.
            if let Err(del) = self.store.delete(&session_id) {
                tracing::error!(%session_id, error = %del, "rollback of session row failed");
            }
            return Err(e);
        }
        Ok(session)
    }

    pub fn get_by_team_pair(
        &self,
        from_team: &str,
        to_team: &str,
    ) -> Result<Option<Session>, IrisError> {
        self.store.get_by_team_pair(from_team, to_team)
    }

    pub fn get_by_session_id(&self, session_id: &str) -> Result<Option<Session>, IrisError> {
        self.store.get_by_session_id(session_id)
    }

    pub fn list(&self, filter: &SessionFilter) -> Result<Vec<Session>, IrisError> {
        self.store.list(filter)
    }

    /// Record one successful exchange on the session.
    pub fn record_exchange(&self, session_id: &str) -> Result<(), IrisError> {
        self.store.increment_message_count(session_id, 1)?;
        self.store.update_last_used(session_id, self.clock.epoch_ms())?;
        Ok(())
    }

    pub fn touch(&self, session_id: &str) -> Result<(), IrisError> {
        self.store.update_last_used(session_id, self.clock.epoch_ms())?;
        Ok(())
    }

    pub fn set_status(&self, session_id: &str, status: SessionStatus) -> Result<(), IrisError> {
        self.store.update_status(session_id, status)?;
        Ok(())
    }

    /// Delete the row and, when requested, the agent's session file.
    pub async fn delete_session(
        &self,
        session_id: &str,
        also_delete_file: bool,
    ) -> Result<(), IrisError> {
        let session = self
            .store
            .get_by_session_id(session_id)?
            .ok_or_else(|| IrisError::SessionNotFound(session_id.to_string()))?;
        self.store.delete(session_id)?;

        if also_delete_file {
            if let Some(team) = self.config.team(&session.to_team) {
                let path = session_file_path(&team.path, session_id)?;
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => tracing::debug!(%session_id, "removed session file"),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => {
                        tracing::warn!(%session_id, error = %e, "could not remove session file")
                    }
                }
            }
        }
        Ok(())
    }

    /// Release the store. Statements are durable per-operation; this exists
    /// so shutdown order is explicit.
    pub fn close(self) {
        drop(self);
    }
}

#[cfg(test)]
#[path = "sessions_tests.rs"]
mod tests;
