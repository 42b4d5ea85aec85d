// libs/appointment-cell/src/services/consistency.rs
//
// Per-subject critical sections for check-then-write booking paths.
//

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

use crate::models::Subject;

type LockTable = Mutex<HashMap<Subject, Arc<AsyncMutex<()>>>>;

fn table(locks: &LockTable) -> MutexGuard<'_, HashMap<Subject, Arc<AsyncMutex<()>>>> {
    locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One async mutex per doctor/patient. Holding the guards for every subject a
/// booking touches means no other booking for those subjects can run its
/// conflict check until this one has written.
///
/// Only serializes callers inside this process.
#[derive(Default)]
pub struct SchedulingLocks {
    locks: Arc<LockTable>,
}

/// Guards held for the duration of one booking operation. Dropping them
/// releases the locks and prunes map entries nobody else is waiting on, on
/// every exit path including a cancelled future.
pub struct SubjectGuards {
    subjects: Vec<Subject>,
    guards: Vec<OwnedMutexGuard<()>>,
    locks: Arc<LockTable>,
}

impl SubjectGuards {
    pub fn subjects(&self) -> &[Subject] {
        &self.subjects
    }
}

impl Drop for SubjectGuards {
    fn drop(&mut self) {
        self.guards.clear();

        let mut locks = table(&self.locks);
        for subject in &self.subjects {
            let idle = locks
                .get(subject)
                .map(|lock| Arc::strong_count(lock) == 1)
                .unwrap_or(false);
            if idle {
                locks.remove(subject);
            }
        }
    }
}

impl SchedulingLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire every subject's lock. Subjects are locked in sorted order so two
    /// callers sharing any pair of subjects cannot deadlock.
    pub async fn acquire(&self, subjects: &[Subject]) -> SubjectGuards {
        let mut ordered = subjects.to_vec();
        ordered.sort();
        ordered.dedup();

        let mut guards = SubjectGuards {
            subjects: ordered.clone(),
            guards: Vec::with_capacity(ordered.len()),
            locks: Arc::clone(&self.locks),
        };
        for subject in &ordered {
            let lock = self.lock_for(*subject);
            guards.guards.push(lock.lock_owned().await);
        }

        debug!("Acquired scheduling locks for {:?}", ordered);
        guards
    }

    pub fn tracked_subjects(&self) -> usize {
        table(&self.locks).len()
    }

    fn lock_for(&self, subject: Subject) -> Arc<AsyncMutex<()>> {
        table(&self.locks)
            .entry(subject)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}
