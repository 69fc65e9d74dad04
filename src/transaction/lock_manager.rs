use std::{
    collections::{HashMap, HashSet},
    sync::Mutex,
    thread::sleep,
    time::{Duration, Instant},
};

use log::debug;

use crate::{
    config::LOCK_TIMEOUT,
    error::DbError,
    storage::page::Rid,
    transaction::Transaction,
    types::{DbResult, TxnID},
};

/// When locks are released relative to transaction end.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TwoPhaseLockingMode {
    Regular,
    Strict,
}

/// How conflicting waits are resolved. Only timeouts run in the current
/// design; a detector thread would use `CYCLE_DETECTION_INTERVAL`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DeadlockPolicy {
    Prevention,
    Detection,
}

struct LockState {
    shared: HashSet<TxnID>,
    exclusive: Option<TxnID>,
}

/// Row-level shared/exclusive locks keyed by RID, re-entrant for the
/// owning transaction. Writers acquire on first touch; the transaction
/// manager releases everything at commit/abort (strict 2PL).
pub struct LockManager {
    mode: TwoPhaseLockingMode,
    policy: DeadlockPolicy,
    lock_table: Mutex<HashMap<Rid, LockState>>,
}

impl LockManager {
    pub fn new(mode: TwoPhaseLockingMode, policy: DeadlockPolicy) -> Self {
        Self {
            mode,
            policy,
            lock_table: Mutex::new(HashMap::new()),
        }
    }

    pub fn mode(&self) -> TwoPhaseLockingMode {
        self.mode
    }

    pub fn policy(&self) -> DeadlockPolicy {
        self.policy
    }

    pub fn lock_shared(&self, txn: &Transaction, rid: Rid) -> DbResult {
        if txn.is_shared_locked(&rid) || txn.is_exclusive_locked(&rid) {
            return Ok(());
        }
        self.wait_for(txn, rid, false)?;
        txn.add_shared_lock(rid);
        Ok(())
    }

    pub fn lock_exclusive(&self, txn: &Transaction, rid: Rid) -> DbResult {
        if txn.is_exclusive_locked(&rid) {
            return Ok(());
        }
        self.wait_for(txn, rid, true)?;
        txn.add_exclusive_lock(rid);
        Ok(())
    }

    /// Release one lock. First release moves the transaction to its
    /// shrinking phase under regular 2PL; the strict mode only ever calls
    /// this from `unlock_all`.
    pub fn unlock(&self, txn: &Transaction, rid: &Rid) -> DbResult {
        let mut table = self.lock_table.lock().unwrap();
        if let Some(state) = table.get_mut(rid) {
            state.shared.remove(&txn.id());
            if state.exclusive == Some(txn.id()) {
                state.exclusive = None;
            }
            if state.shared.is_empty() && state.exclusive.is_none() {
                table.remove(rid);
            }
        }
        Ok(())
    }

    /// Commit/abort path: drop every lock the transaction holds.
    pub fn unlock_all(&self, txn: &Transaction) {
        let rids = txn.locked_rids();
        for rid in &rids {
            if let Err(e) = self.unlock(txn, rid) {
                e.show_backtrace();
            }
        }
        txn.clear_lock_sets();
        if !rids.is_empty() {
            debug!("{} released {} locks", txn, rids.len());
        }
    }

    /// Poll until the lock is grantable or the timeout passes. The grant
    /// itself happens atomically under the table mutex.
    fn wait_for(&self, txn: &Transaction, rid: Rid, exclusive: bool) -> DbResult {
        let start = Instant::now();
        loop {
            if self.try_grant(txn, rid, exclusive) {
                return Ok(());
            }
            if start.elapsed() > LOCK_TIMEOUT {
                return Err(DbError::LockTimeout(format!(
                    "{} waiting for {} on {}",
                    txn,
                    if exclusive { "X" } else { "S" },
                    rid
                )));
            }
            sleep(Duration::from_millis(10));
        }
    }

    fn try_grant(&self, txn: &Transaction, rid: Rid, exclusive: bool) -> bool {
        let mut table = self.lock_table.lock().unwrap();
        let state = table.entry(rid).or_insert_with(|| LockState {
            shared: HashSet::new(),
            exclusive: None,
        });

        if let Some(holder) = state.exclusive {
            if holder != txn.id() {
                return false;
            }
        }

        if exclusive {
            // an upgrade succeeds once this txn is the only reader left
            let foreign_reader = state
                .shared
                .iter()
                .any(|holder| *holder != txn.id());
            if foreign_reader {
                return false;
            }
            state.shared.remove(&txn.id());
            state.exclusive = Some(txn.id());
        } else {
            state.shared.insert(txn.id());
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reentrant_and_upgrade() {
        let lm = LockManager::new(TwoPhaseLockingMode::Strict, DeadlockPolicy::Prevention);
        assert_eq!(lm.mode(), TwoPhaseLockingMode::Strict);
        assert_eq!(lm.policy(), DeadlockPolicy::Prevention);

        let txn = Transaction::new(1);
        let rid = Rid::new(1, 0);

        lm.lock_shared(&txn, rid).unwrap();
        lm.lock_shared(&txn, rid).unwrap();
        lm.lock_exclusive(&txn, rid).unwrap();
        assert!(txn.is_exclusive_locked(&rid));
        assert!(!txn.is_shared_locked(&rid));

        lm.unlock_all(&txn);
        assert!(!txn.is_exclusive_locked(&rid));
    }

    #[test]
    fn test_conflicting_exclusive_times_out() {
        let lm = LockManager::new(TwoPhaseLockingMode::Strict, DeadlockPolicy::Prevention);
        let holder = Transaction::new(1);
        let waiter = Transaction::new(2);
        let rid = Rid::new(1, 0);

        lm.lock_exclusive(&holder, rid).unwrap();
        let result = lm.lock_exclusive(&waiter, rid);
        assert!(matches!(result, Err(DbError::LockTimeout(_))));

        lm.unlock_all(&holder);
        lm.lock_exclusive(&waiter, rid).unwrap();
    }

    #[test]
    fn test_shared_locks_coexist() {
        let lm = LockManager::new(TwoPhaseLockingMode::Strict, DeadlockPolicy::Prevention);
        let a = Transaction::new(1);
        let b = Transaction::new(2);
        let rid = Rid::new(2, 3);

        lm.lock_shared(&a, rid).unwrap();
        lm.lock_shared(&b, rid).unwrap();

        // the upgrade must wait for the other reader
        assert!(lm.lock_exclusive(&a, rid).is_err());

        lm.unlock_all(&b);
        lm.lock_exclusive(&a, rid).unwrap();
    }
}
