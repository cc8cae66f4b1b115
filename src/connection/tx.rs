use crate::config::TransactionMode;
use crate::engine::{BatchUnit, QueryToken};
use crate::error::BridgeError;

use super::core::ConnectionInner;

/// Where a connection stands with respect to its manual transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// No transaction opened yet (always the case in autocommit mode).
    Idle,
    Open,
    Committed,
    RolledBack,
}

#[derive(Debug)]
pub(crate) struct TxState {
    auto_commit: bool,
    state: TransactionState,
}

impl TxState {
    pub(super) fn new(mode: TransactionMode) -> Self {
        Self {
            auto_commit: mode == TransactionMode::AutoCommit,
            state: TransactionState::Idle,
        }
    }

    pub(super) fn auto_commit(&self) -> bool {
        self.auto_commit
    }

    pub(super) fn state(&self) -> TransactionState {
        self.state
    }
}

impl ConnectionInner {
    /// In manual mode, open the transaction if none is running. The caller holds the
    /// connection permit for `token`.
    pub(crate) async fn begin_if_manual(&self, token: QueryToken) -> Result<(), BridgeError> {
        {
            let tx = self.tx();
            if tx.auto_commit || tx.state == TransactionState::Open {
                return Ok(());
            }
        }
        self.native.execute_script("BEGIN TRANSACTION;", token).await?;
        self.tx().state = TransactionState::Open;
        tracing::debug!("opened manual transaction");
        Ok(())
    }

    /// Unit a batch runs in once [`ConnectionInner::begin_if_manual`] has run.
    pub(crate) fn batch_unit(&self) -> BatchUnit {
        if self.tx().auto_commit {
            BatchUnit::Autocommit
        } else {
            BatchUnit::Transaction
        }
    }

    /// Commit or roll back the running transaction. Without one this does nothing.
    pub(super) async fn finish_transaction(&self, commit: bool) -> Result<(), BridgeError> {
        self.ensure_open()?;
        let token = self.next_token();
        let _permit = self.enter(token).await?;
        if self.tx().state != TransactionState::Open {
            return Ok(());
        }
        let (sql, done) = if commit {
            ("COMMIT;", TransactionState::Committed)
        } else {
            ("ROLLBACK;", TransactionState::RolledBack)
        };
        self.native.execute_script(sql, token).await?;
        self.tx().state = done;
        tracing::debug!(commit, "finished manual transaction");
        Ok(())
    }

    /// Switch modes; switching to autocommit commits a running transaction.
    pub(super) async fn set_auto_commit(&self, auto_commit: bool) -> Result<(), BridgeError> {
        self.ensure_open()?;
        let commit_needed = {
            let mut tx = self.tx();
            if tx.auto_commit == auto_commit {
                return Ok(());
            }
            tx.auto_commit = auto_commit;
            auto_commit && tx.state == TransactionState::Open
        };
        if commit_needed {
            self.finish_transaction(true).await?;
        }
        Ok(())
    }
}
