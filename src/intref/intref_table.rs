//! Opaque string handles for values that must cross a boundary where only
//! text can travel, e.g. a task handed to a remote controller.
//!
//! A handle is `intref:<slot>-<generation>`. Reusing a slot bumps its
//! generation, so a stale handle never redeems a newer value.

use std::any::type_name;
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;
use tracing::trace;

use crate::constants::INTREF_PREFIX;
use crate::IntrefError;

struct IntrefEntry {
    value: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
    last_touch: Instant,
}

#[derive(Default)]
struct Slot {
    generation: u32,
    entry: Option<IntrefEntry>,
}

#[derive(Default)]
struct Slots {
    slots: Vec<Slot>,
    free: Vec<usize>,
}

pub struct IntrefTable {
    inner: Mutex<Slots>,
    idle_timeout: Duration,
}

impl IntrefTable {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(Slots::default()),
            idle_timeout,
        }
    }

    /// Stores `value` and returns its handle.
    pub fn register<T>(
        &self,
        value: Arc<T>,
    ) -> String
    where
        T: Any + Send + Sync,
    {
        let mut inner = self.inner.lock();
        let index = match inner.free.pop() {
            Some(index) => index,
            None => {
                inner.slots.push(Slot::default());
                inner.slots.len() - 1
            }
        };
        let slot = &mut inner.slots[index];
        slot.entry = Some(IntrefEntry {
            value,
            type_name: type_name::<T>(),
            last_touch: Instant::now(),
        });
        let id = format!("{INTREF_PREFIX}{index}-{}", slot.generation);
        trace!(%id, type_name = type_name::<T>(), "intref registered");
        id
    }

    /// Returns the value behind `id` and refreshes its idle timer.
    pub fn redeem<T>(
        &self,
        id: &str,
    ) -> std::result::Result<Arc<T>, IntrefError>
    where
        T: Any + Send + Sync,
    {
        let (index, generation) = parse(id)?;
        let mut inner = self.inner.lock();
        let entry = inner
            .slots
            .get_mut(index)
            .filter(|slot| slot.generation == generation)
            .and_then(|slot| slot.entry.as_mut())
            .ok_or_else(|| IntrefError::Missing(id.to_string()))?;

        let actual = entry.type_name;
        let value = entry.value.clone().downcast::<T>().map_err(|_| IntrefError::TypeMismatch {
            id: id.to_string(),
            expected: type_name::<T>(),
            actual,
        })?;
        entry.last_touch = Instant::now();
        Ok(value)
    }

    pub fn remove(
        &self,
        id: &str,
    ) -> bool {
        let Ok((index, generation)) = parse(id) else {
            return false;
        };
        let mut inner = self.inner.lock();
        let live = matches!(
            inner.slots.get(index),
            Some(slot) if slot.generation == generation && slot.entry.is_some()
        );
        if live {
            release(&mut inner, index);
        }
        live
    }

    /// Evicts every handle idle for longer than the timeout.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let idle: Vec<usize> = inner
            .slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| {
                slot.entry
                    .as_ref()
                    .is_some_and(|e| now.duration_since(e.last_touch) > self.idle_timeout)
            })
            .map(|(index, _)| index)
            .collect();
        for index in &idle {
            release(&mut inner, *index);
        }
        if !idle.is_empty() {
            debug!(evicted = idle.len(), "swept idle intrefs");
        }
        idle.len()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().slots.iter().filter(|s| s.entry.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn release(
    inner: &mut Slots,
    index: usize,
) {
    let slot = &mut inner.slots[index];
    slot.entry = None;
    slot.generation = slot.generation.wrapping_add(1);
    inner.free.push(index);
}

fn parse(id: &str) -> std::result::Result<(usize, u32), IntrefError> {
    let malformed = || IntrefError::Malformed(id.to_string());
    let (index, generation) = id
        .strip_prefix(INTREF_PREFIX)
        .and_then(|rest| rest.split_once('-'))
        .ok_or_else(malformed)?;
    Ok((
        index.parse().map_err(|_| malformed())?,
        generation.parse().map_err(|_| malformed())?,
    ))
}
