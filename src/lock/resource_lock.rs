//! One mutex and one condition variable coordinating several named resources.
//!
//! Reader/writer resources own a READ and a WRITE bit; exclusive resources own
//! a single bit. A [`LockMask`] may name several resources at once; they are
//! handled one after the other inside a single critical section.
//!
//! The non-blocking mode lets a lock-protected mutation trigger callbacks that
//! want the same lock on the same call stack: the callback gets `false` and
//! reschedules itself through `TaskScheduler::run_idle` instead of deadlocking.

use bitflags::bitflags;
use parking_lot::Condvar;
use parking_lot::Mutex;
use tracing::error;
use tracing::trace;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct LockMask: u32 {
        /// Property definitions, shared while resolving requests
        const REGISTRY_READ = 1 << 0;
        /// Property definitions, exclusive while reloading
        const REGISTRY_WRITE = 1 << 1;
        /// Pending batches, armed flush triggers and in-flight sessions
        const BATCH = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy)]
struct RwResource {
    name: &'static str,
    read: LockMask,
    write: LockMask,
}

const RW_COUNT: usize = 1;

const RW_RESOURCES: [RwResource; RW_COUNT] = [RwResource {
    name: "registry",
    read: LockMask::REGISTRY_READ,
    write: LockMask::REGISTRY_WRITE,
}];

const EXCLUSIVE_RESOURCES: [LockMask; 1] = [LockMask::BATCH];

#[derive(Debug)]
struct LockState {
    held: LockMask,
    readers: [u32; RW_COUNT],
    writers_waiting: [u32; RW_COUNT],
}

impl Default for LockState {
    fn default() -> Self {
        Self {
            held: LockMask::empty(),
            readers: [0; RW_COUNT],
            writers_waiting: [0; RW_COUNT],
        }
    }
}

impl LockState {
    fn read_blocked(
        &self,
        idx: usize,
    ) -> bool {
        self.held.contains(RW_RESOURCES[idx].write) || self.writers_waiting[idx] > 0
    }

    fn write_blocked(
        &self,
        idx: usize,
    ) -> bool {
        let rw = RW_RESOURCES[idx];
        self.held.intersects(rw.read | rw.write)
    }
}

/// Snapshot of the reader/writer bookkeeping of one resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RwCounters {
    pub readers: u32,
    pub writers_waiting: u32,
}

#[derive(Debug, Default)]
pub struct ResourceLock {
    state: Mutex<LockState>,
    cond: Condvar,
}

impl ResourceLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires every resource named in `mask`.
    ///
    /// With `blocking == false` nothing is acquired and `false` is returned as
    /// soon as one requested resource is held (or, for a read, has a writer
    /// queued); the condition variable is never waited on.
    pub fn acquire(
        &self,
        mask: LockMask,
        blocking: bool,
    ) -> bool {
        let mut state = self.state.lock();

        if !blocking && !Self::available(&state, mask) {
            trace!(?mask, "non-blocking acquire declined");
            return false;
        }

        for (idx, rw) in RW_RESOURCES.iter().enumerate() {
            let wants_read = mask.contains(rw.read);
            let wants_write = mask.contains(rw.write);
            if wants_read && wants_write {
                error!(resource = rw.name, "cannot acquire a resource for read and write at once");
                continue;
            }

            if wants_write {
                state.writers_waiting[idx] += 1;
                while state.write_blocked(idx) {
                    self.cond.wait(&mut state);
                }
                state.writers_waiting[idx] -= 1;
                state.held.insert(rw.write);
            } else if wants_read {
                while state.read_blocked(idx) {
                    self.cond.wait(&mut state);
                }
                state.readers[idx] += 1;
                state.held.insert(rw.read);
            }
        }

        for bit in EXCLUSIVE_RESOURCES {
            if mask.contains(bit) {
                while state.held.contains(bit) {
                    self.cond.wait(&mut state);
                }
                state.held.insert(bit);
            }
        }

        true
    }

    /// Releases every resource named in `mask`.
    pub fn release(
        &self,
        mask: LockMask,
    ) {
        let mut state = self.state.lock();
        let mut wake = false;

        for (idx, rw) in RW_RESOURCES.iter().enumerate() {
            let releases_read = mask.contains(rw.read);
            let releases_write = mask.contains(rw.write);
            if releases_read && releases_write {
                error!(resource = rw.name, "cannot release a resource for read and write at once");
                continue;
            }

            if releases_write {
                if !state.held.contains(rw.write) {
                    error!(resource = rw.name, "release of a resource not held for write");
                    continue;
                }
                state.held.remove(rw.write);
                // several blocked readers may proceed now
                wake = true;
            } else if releases_read {
                if state.readers[idx] == 0 {
                    error!(resource = rw.name, "release of a resource not held for read");
                    continue;
                }
                state.readers[idx] -= 1;
                if state.readers[idx] == 0 {
                    state.held.remove(rw.read);
                    wake = true;
                }
            }
        }

        for bit in EXCLUSIVE_RESOURCES {
            if mask.contains(bit) {
                if !state.held.contains(bit) {
                    error!(?bit, "release of a resource not held");
                    continue;
                }
                state.held.remove(bit);
                wake = true;
            }
        }

        drop(state);

        // Waiters of all resources share one condvar: a single wakeup may land
        // on a thread waiting for another resource, so always broadcast.
        if wake {
            self.cond.notify_all();
        }
    }

    /// Blocking acquire returning a guard that releases on drop.
    pub fn lock(
        &self,
        mask: LockMask,
    ) -> ResourceGuard<'_> {
        self.acquire(mask, true);
        ResourceGuard { lock: self, mask }
    }

    /// Non-blocking acquire; `None` means LOCK_BUSY.
    pub fn try_lock(
        &self,
        mask: LockMask,
    ) -> Option<ResourceGuard<'_>> {
        if self.acquire(mask, false) {
            Some(ResourceGuard { lock: self, mask })
        } else {
            None
        }
    }

    /// Bits currently held
    pub fn held(&self) -> LockMask {
        self.state.lock().held
    }

    /// Counters of the reader/writer resource owning `read_bit`
    pub fn counters(
        &self,
        read_bit: LockMask,
    ) -> Option<RwCounters> {
        let state = self.state.lock();
        RW_RESOURCES
            .iter()
            .position(|rw| rw.read == read_bit || rw.write == read_bit)
            .map(|idx| RwCounters {
                readers: state.readers[idx],
                writers_waiting: state.writers_waiting[idx],
            })
    }

    fn available(
        state: &LockState,
        mask: LockMask,
    ) -> bool {
        for (idx, rw) in RW_RESOURCES.iter().enumerate() {
            if mask.contains(rw.write) && state.write_blocked(idx) {
                return false;
            }
            if mask.contains(rw.read) && (state.write_blocked(idx) || state.read_blocked(idx)) {
                return false;
            }
        }
        EXCLUSIVE_RESOURCES
            .iter()
            .all(|bit| !mask.contains(*bit) || !state.held.contains(*bit))
    }
}

/// Releases its mask when dropped.
#[must_use = "the resources are released as soon as the guard is dropped"]
#[derive(Debug)]
pub struct ResourceGuard<'a> {
    lock: &'a ResourceLock,
    mask: LockMask,
}

impl ResourceGuard<'_> {
    pub fn mask(&self) -> LockMask {
        self.mask
    }
}

impl Drop for ResourceGuard<'_> {
    fn drop(&mut self) {
        self.lock.release(self.mask);
    }
}
