//! Lock → apply → commit/discard
//!
//! A [`Transaction`] wraps one locked session. Every failure before the
//! commit goes through [`Transaction::or_discard`], so an error never leaves
//! statements staged on the device. A rejected commit is discarded too.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{EngineEvent, emit};
use crate::error::Result;
use crate::statement::ConfigStatement;
use crate::traits::DeviceSession;

/// Resource a transaction works on, for events and logs
#[derive(Debug, Clone, Copy)]
pub struct TransactionScope<'a> {
    /// Resource kind
    pub kind: &'static str,
    /// Resource name
    pub name: &'a str,
    /// Engine event sink
    pub events: &'a mpsc::Sender<EngineEvent>,
}

/// What a successful commit produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReceipt {
    /// Statements applied, in order
    pub statements: Vec<ConfigStatement>,
    /// Warnings returned by the device
    pub warnings: Vec<String>,
    /// When the commit completed
    pub committed_at: DateTime<Utc>,
}

/// One locked configuration transaction
pub struct Transaction<'a> {
    session: &'a dyn DeviceSession,
    scope: TransactionScope<'a>,
    staged: Vec<ConfigStatement>,
}

impl<'a> Transaction<'a> {
    /// Lock the device configuration
    pub async fn begin(
        session: &'a dyn DeviceSession,
        scope: TransactionScope<'a>,
    ) -> Result<Transaction<'a>> {
        session.lock().await?;
        debug!(
            "Locked {} for {} {}",
            session.device_name(),
            scope.kind,
            scope.name
        );
        Ok(Self {
            session,
            scope,
            staged: Vec::new(),
        })
    }

    /// Run a query inside the transaction, discarding on failure
    pub async fn query(&self, command: &str) -> Result<String> {
        let reply = self.session.run_query(command).await;
        self.or_discard(reply).await
    }

    /// Stage statements, discarding on failure
    pub async fn apply(&mut self, statements: &[ConfigStatement]) -> Result<()> {
        if statements.is_empty() {
            return Ok(());
        }
        let applied = self.session.apply_statements(statements).await;
        self.or_discard(applied).await?;
        self.staged.extend_from_slice(statements);
        Ok(())
    }

    /// Commit staged statements
    ///
    /// The commit is discarded if the device rejects it.
    pub async fn commit(self, description: &str) -> Result<CommitReceipt> {
        let warnings = match self.session.commit(description).await {
            Ok(warnings) => warnings,
            Err(e) => {
                self.session.discard_pending().await;
                self.discarded(&e.to_string());
                return Err(e);
            }
        };

        for warning in &warnings {
            warn!(
                "{}: commit of {} {} returned warning: {}",
                self.session.device_name(),
                self.scope.kind,
                self.scope.name,
                warning
            );
        }
        info!(
            "Committed '{}' on {} ({} statements)",
            description,
            self.session.device_name(),
            self.staged.len()
        );
        emit(
            self.scope.events,
            EngineEvent::Committed {
                kind: self.scope.kind,
                name: self.scope.name.to_string(),
                description: description.to_string(),
                statements: self.staged.len(),
            },
        );

        Ok(CommitReceipt {
            statements: self.staged,
            warnings,
            committed_at: Utc::now(),
        })
    }

    /// Drop staged statements and release the lock
    pub async fn discard(self, reason: &str) {
        self.session.discard_pending().await;
        self.discarded(reason);
    }

    /// Pass `result` through, discarding the transaction first when it is
    /// an error
    pub async fn or_discard<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.session.discard_pending().await;
            self.discarded(&e.to_string());
        }
        result
    }

    fn discarded(&self, reason: &str) {
        debug!(
            "Discarded transaction for {} {}: {}",
            self.scope.kind, self.scope.name, reason
        );
        emit(
            self.scope.events,
            EngineEvent::Discarded {
                kind: self.scope.kind,
                name: self.scope.name.to_string(),
                reason: reason.to_string(),
            },
        );
    }
}
