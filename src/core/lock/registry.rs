use std::{
    collections::HashMap,
    fmt,
    mem::ManuallyDrop,
    ops::Deref,
    path::MAIN_SEPARATOR,
    sync::{Arc, Condvar, LazyLock, Mutex, PoisonError, Weak},
};

static GLOBAL: LazyLock<LockRegistry> = LazyLock::new(LockRegistry::new);

/// Replace path separators so a lock name can double as a file name.
pub fn sanitize_name(name: &str) -> String {
    name.replace(MAIN_SEPARATOR, "_")
}

/// A named binary semaphore: at most one holder at a time.
///
/// Unlike a `Mutex`, the holder is not tied to a thread, so a lock taken on
/// one thread may be released from another.
pub struct LockEntry {
    name: String,
    held: Mutex<bool>,
    released: Condvar,
}

impl LockEntry {
    fn new(name: String) -> Self {
        Self {
            name,
            held: Mutex::new(false),
            released: Condvar::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Block until the entry is free, then take it.
    pub fn acquire(&self) {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        while *held {
            held = self
                .released
                .wait(held)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *held = true;
    }

    /// Take the entry if it is free. Returns whether it was taken.
    pub fn try_acquire(&self) -> bool {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        if *held {
            return false;
        }
        *held = true;
        true
    }

    pub fn release(&self) {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        *held = false;
        drop(held);
        self.released.notify_one();
    }

    pub fn is_held(&self) -> bool {
        *self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for LockEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockEntry")
            .field("name", &self.name)
            .field("held", &self.is_held())
            .finish()
    }
}

/// Table of named lock entries.
///
/// The table only keeps weak references. A [`LockHandle`] is the strong
/// reference; when the last handle for a name drops, the slot is removed and
/// a later request for that name gets a fresh entry.
#[derive(Clone, Default)]
pub struct LockRegistry {
    entries: Arc<Mutex<HashMap<String, Weak<LockEntry>>>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide default registry.
    pub fn global() -> &'static Self {
        &GLOBAL
    }

    /// Get the live entry for `name`, creating it if absent.
    pub fn get(&self, name: &str) -> LockHandle {
        let key = sanitize_name(name);
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

        let entry = match entries.get(&key).and_then(Weak::upgrade) {
            Some(entry) => entry,
            None => {
                let entry = Arc::new(LockEntry::new(key.clone()));
                entries.insert(key, Arc::downgrade(&entry));
                entry
            }
        };

        LockHandle {
            entry: ManuallyDrop::new(entry),
            registry: self.clone(),
        }
    }

    /// Number of entries that currently have at least one handle.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop `entry` under the table mutex and remove its slot if it was the
    /// last strong reference.
    fn release_handle(&self, entry: Arc<LockEntry>) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let key = entry.name().to_string();
        // Every strong count change for a live slot happens under this mutex,
        // so whichever handle drops last sees a dead slot here.
        drop(entry);
        if entries.get(&key).is_some_and(|weak| weak.strong_count() == 0) {
            entries.remove(&key);
        }
    }

    /// Slots in the table, live or not.
    #[cfg(test)]
    fn slots(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl fmt::Debug for LockRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockRegistry")
            .field("live", &self.len())
            .finish()
    }
}

/// Strong reference to a registry entry. Dropping it lets the registry reclaim
/// the slot once no other handle for the same name exists.
pub struct LockHandle {
    entry: ManuallyDrop<Arc<LockEntry>>,
    registry: LockRegistry,
}

impl LockHandle {
    /// Whether both handles point at the same underlying entry.
    pub fn same_entry(&self, other: &Self) -> bool {
        Arc::ptr_eq(&*self.entry, &*other.entry)
    }
}

impl Deref for LockHandle {
    type Target = LockEntry;

    fn deref(&self) -> &LockEntry {
        &self.entry
    }
}

impl fmt::Debug for LockHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        (**self.entry).fmt(f)
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        // SAFETY: `entry` is taken exactly once, here, and never read again.
        let entry = unsafe { ManuallyDrop::take(&mut self.entry) };
        self.registry.release_handle(entry);
    }
}
