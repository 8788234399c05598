use tracing::{debug, warn};

use crate::error::DbError;
use crate::store::{Snapshot, Store};

enum TxnState {
    Idle,
    Active(Snapshot),
}

/// Snapshot-based transaction emulation.
///
/// Starting a transaction snapshots the whole store; aborting restores it.
/// Writes are not isolated: every handle on the store sees uncommitted
/// changes, and an abort also discards writes made through other handles
/// while the transaction was open.
///
/// Dropping a session with an open transaction aborts it.
pub struct Session {
    store: Store,
    txn: TxnState,
    ended: bool,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("in_transaction", &self.in_transaction())
            .field("ended", &self.ended)
            .finish()
    }
}

impl Session {
    pub(crate) fn new(store: Store) -> Self {
        Self {
            store,
            txn: TxnState::Idle,
            ended: false,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn in_transaction(&self) -> bool {
        matches!(self.txn, TxnState::Active(_))
    }

    pub fn start_transaction(&mut self) -> Result<(), DbError> {
        if self.ended {
            return Err(DbError::SessionEnded);
        }
        if self.in_transaction() {
            return Err(DbError::TransactionInProgress);
        }
        self.txn = TxnState::Active(self.store.snapshot()?);
        debug!("transaction started");
        Ok(())
    }

    /// Keep every write since the transaction started. A no-op when no
    /// transaction is open.
    pub fn commit_transaction(&mut self) -> Result<(), DbError> {
        if let TxnState::Active(_) = std::mem::replace(&mut self.txn, TxnState::Idle) {
            debug!("transaction committed");
        }
        Ok(())
    }

    /// Restore the store to its state when the transaction started. A
    /// no-op when no transaction is open.
    pub fn abort_transaction(&mut self) -> Result<(), DbError> {
        match std::mem::replace(&mut self.txn, TxnState::Idle) {
            TxnState::Active(snapshot) => {
                self.store.restore(snapshot)?;
                debug!("transaction aborted");
                Ok(())
            }
            TxnState::Idle => Ok(()),
        }
    }

    /// Run `f` inside a transaction: commit if it returns `Ok`, abort and
    /// pass the error through otherwise.
    ///
    /// A failure to roll back is logged and does not replace the original
    /// error.
    pub fn with_transaction<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Store) -> Result<T, E>,
        E: From<DbError>,
    {
        self.start_transaction()?;
        match f(&self.store) {
            Ok(value) => {
                self.commit_transaction()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = self.abort_transaction() {
                    warn!(error = %rollback, "transaction rollback failed");
                }
                Err(err)
            }
        }
    }

    /// Abort any open transaction and close the session. Idempotent.
    pub fn end_session(&mut self) {
        if self.ended {
            return;
        }
        if let Err(err) = self.abort_transaction() {
            warn!(error = %err, "rollback on session end failed");
        }
        self.ended = true;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.end_session();
    }
}
