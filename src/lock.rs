//! Locking and atomic writes for worklog
//!
//! Two layers of mutual exclusion, both with a bounded wait:
//! - [`LockTable`]: in-process reader/writer lock per assignment id. Threads
//!   mutating the same assignment queue up; different ids never contend.
//! - [`FileLock`]: fs2/flock lock files under `.worklog/`, so separate
//!   `worklog` processes are serialized the same way.
//!
//! Writes go through [`write_atomic`] (temp file + rename) so a reader never
//! observes a half-written record.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use fs2::FileExt;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Default lock timeout in milliseconds
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5000;

/// Default retry interval when waiting for a file lock
const LOCK_RETRY_INTERVAL_MS: u64 = 20;

fn is_lock_contended(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::WouldBlock {
        return true;
    }

    // On Windows, fs2/libc can surface lock/sharing violations as "Other".
    // Treat them as contention so callers get Err(LockFailed) after timeout.
    #[cfg(windows)]
    {
        matches!(err.raw_os_error(), Some(32) | Some(33))
    }
    #[cfg(not(windows))]
    {
        false
    }
}

/// Whether a lock admits other readers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

/// A file lock guard that releases the lock when dropped
pub struct FileLock {
    file: File,
    path: PathBuf,
    mode: LockMode,
}

impl FileLock {
    /// Acquire an exclusive lock on a file with timeout
    ///
    /// If the file doesn't exist, it will be created.
    /// Returns an error if the lock cannot be acquired within the timeout.
    pub fn acquire(path: impl AsRef<Path>, timeout_ms: u64) -> Result<Self> {
        Self::acquire_with_mode(path, LockMode::Exclusive, timeout_ms)
    }

    /// Acquire a shared (reader) lock on a file with timeout
    pub fn acquire_shared(path: impl AsRef<Path>, timeout_ms: u64) -> Result<Self> {
        Self::acquire_with_mode(path, LockMode::Shared, timeout_ms)
    }

    fn acquire_with_mode(path: impl AsRef<Path>, mode: LockMode, timeout_ms: u64) -> Result<Self> {
        let path = path.as_ref();
        let file = open_lock_file(path)?;

        let start = Instant::now();
        let timeout = Duration::from_millis(timeout_ms);
        let retry_interval = Duration::from_millis(LOCK_RETRY_INTERVAL_MS);

        loop {
            match try_lock(&file, mode) {
                Ok(()) => {
                    return Ok(FileLock {
                        file,
                        path: path.to_path_buf(),
                        mode,
                    });
                }
                Err(e) if is_lock_contended(&e) => {
                    if start.elapsed() >= timeout {
                        return Err(Error::LockFailed(path.to_path_buf()));
                    }
                    std::thread::sleep(retry_interval);
                }
                Err(e) => {
                    return Err(Error::Io(e));
                }
            }
        }
    }

    /// Try to acquire an exclusive lock without waiting
    ///
    /// Returns `Ok(Some(lock))` if acquired, `Ok(None)` if would block,
    /// or `Err` for other errors.
    pub fn try_acquire(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let path = path.as_ref();
        let file = open_lock_file(path)?;

        match try_lock(&file, LockMode::Exclusive) {
            Ok(()) => Ok(Some(FileLock {
                file,
                path: path.to_path_buf(),
                mode: LockMode::Exclusive,
            })),
            Err(e) if is_lock_contended(&e) => Ok(None),
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Get the path to the locked file
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        // Unlock the file - ignore errors during drop
        let _ = FileExt::unlock(&self.file);
    }
}

fn open_lock_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?;
    Ok(file)
}

fn try_lock(file: &File, mode: LockMode) -> io::Result<()> {
    match mode {
        // Fully qualified: std's inherent File locking methods shadow fs2's.
        LockMode::Shared => FileExt::try_lock_shared(file),
        LockMode::Exclusive => FileExt::try_lock_exclusive(file),
    }
}

/// Atomically write data to a file
///
/// This writes to a temporary file in the same directory, then renames
/// it to the target path. This ensures the file is either fully written
/// or not modified at all.
///
/// Note: This does NOT acquire a lock. Callers hold the record's lock file.
pub fn write_atomic(path: impl AsRef<Path>, data: &[u8]) -> Result<()> {
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    // Temp file must live in the same directory for rename to be atomic
    let temp_path = path.with_extension(format!(
        "{}.tmp.{}",
        path.extension().and_then(|e| e.to_str()).unwrap_or(""),
        std::process::id()
    ));

    let mut temp_file = File::create(&temp_path)?;
    temp_file.write_all(data)?;
    temp_file.sync_all()?;
    drop(temp_file);

    fs::rename(&temp_path, path)?;

    Ok(())
}

// =============================================================================
// In-process lock table
// =============================================================================

#[derive(Debug, Default)]
struct Slot {
    readers: usize,
    writer: bool,
    waiting_writers: usize,
}

impl Slot {
    fn is_idle(&self) -> bool {
        self.readers == 0 && !self.writer && self.waiting_writers == 0
    }
}

/// Reader/writer locks keyed by assignment id
///
/// Slots are created on first use and dropped again once idle, so the table
/// only holds ids that are currently locked or waited on. Waiting writers
/// block new readers; a steady stream of eligibility checks cannot starve a
/// stop.
#[derive(Debug, Default)]
pub struct LockTable {
    slots: Mutex<HashMap<Uuid, Slot>>,
    released: Condvar,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire exclusive access to `id`, waiting at most `timeout`.
    pub fn write(&self, id: Uuid, timeout: Duration) -> Result<KeyGuard<'_>> {
        let deadline = Instant::now() + timeout;
        let mut slots = self.slots_guard();
        slots.entry(id).or_default().waiting_writers += 1;

        loop {
            let slot = slots.entry(id).or_default();
            if !slot.writer && slot.readers == 0 {
                slot.waiting_writers -= 1;
                slot.writer = true;
                return Ok(KeyGuard {
                    table: self,
                    id,
                    mode: LockMode::Exclusive,
                });
            }

            match self.wait(slots, deadline) {
                Some(guard) => slots = guard,
                None => {
                    let mut slots = self.slots_guard();
                    if let Some(slot) = slots.get_mut(&id) {
                        slot.waiting_writers -= 1;
                        if slot.is_idle() {
                            slots.remove(&id);
                        }
                    }
                    drop(slots);
                    self.released.notify_all();
                    tracing::debug!(assignment = %id, "timed out waiting for write lock");
                    return Err(Error::LockTimeout(id));
                }
            }
        }
    }

    /// Acquire shared access to `id`, waiting at most `timeout`.
    pub fn read(&self, id: Uuid, timeout: Duration) -> Result<KeyGuard<'_>> {
        let deadline = Instant::now() + timeout;
        let mut slots = self.slots_guard();

        loop {
            let slot = slots.entry(id).or_default();
            if !slot.writer && slot.waiting_writers == 0 {
                slot.readers += 1;
                return Ok(KeyGuard {
                    table: self,
                    id,
                    mode: LockMode::Shared,
                });
            }

            match self.wait(slots, deadline) {
                Some(guard) => slots = guard,
                None => {
                    let mut slots = self.slots_guard();
                    if slots.get(&id).is_some_and(Slot::is_idle) {
                        slots.remove(&id);
                    }
                    tracing::debug!(assignment = %id, "timed out waiting for read lock");
                    return Err(Error::LockTimeout(id));
                }
            }
        }
    }

    /// Number of ids currently locked or waited on
    pub fn active_keys(&self) -> usize {
        self.slots_guard().len()
    }

    fn slots_guard(&self) -> MutexGuard<'_, HashMap<Uuid, Slot>> {
        // Slot counters stay consistent even if a holder panicked.
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn wait<'a>(
        &'a self,
        slots: MutexGuard<'a, HashMap<Uuid, Slot>>,
        deadline: Instant,
    ) -> Option<MutexGuard<'a, HashMap<Uuid, Slot>>> {
        let now = Instant::now();
        if now >= deadline {
            return None;
        }
        let (guard, _) = self
            .released
            .wait_timeout(slots, deadline - now)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Some(guard)
    }

    fn release(&self, id: Uuid, mode: LockMode) {
        let mut slots = self.slots_guard();
        if let Some(slot) = slots.get_mut(&id) {
            match mode {
                LockMode::Shared => slot.readers = slot.readers.saturating_sub(1),
                LockMode::Exclusive => slot.writer = false,
            }
            if slot.is_idle() {
                slots.remove(&id);
            }
        }
        drop(slots);
        self.released.notify_all();
    }
}

/// Guard for a [`LockTable`] entry; releases on drop
pub struct KeyGuard<'a> {
    table: &'a LockTable,
    id: Uuid,
    mode: LockMode,
}

impl KeyGuard<'_> {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        self.table.release(self.id, self.mode);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;
    use tempfile::TempDir;

    #[test]
    fn test_file_lock_acquire_release() {
        let temp_dir = TempDir::new().unwrap();
        let lock_path = temp_dir.path().join("test.lock");

        let lock = FileLock::acquire(&lock_path, 1000).unwrap();
        assert!(lock_path.exists());
        assert_eq!(lock.mode(), LockMode::Exclusive);

        let result = FileLock::try_acquire(&lock_path).unwrap();
        assert!(result.is_none());

        drop(lock);

        let lock2 = FileLock::try_acquire(&lock_path).unwrap();
        assert!(lock2.is_some());
    }

    #[test]
    fn shared_file_locks_coexist_but_block_writers() {
        let temp_dir = TempDir::new().unwrap();
        let lock_path = temp_dir.path().join("shared.lock");

        let first = FileLock::acquire_shared(&lock_path, 1000).unwrap();
        let second = FileLock::acquire_shared(&lock_path, 1000).unwrap();
        assert!(FileLock::try_acquire(&lock_path).unwrap().is_none());

        drop(first);
        drop(second);
        assert!(FileLock::try_acquire(&lock_path).unwrap().is_some());
    }

    #[test]
    fn test_atomic_write() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("test.txt");

        write_atomic(&file_path, b"Hello, World!").unwrap();
        assert_eq!(fs::read_to_string(&file_path).unwrap(), "Hello, World!");

        write_atomic(&file_path, b"Updated!").unwrap();
        assert_eq!(fs::read_to_string(&file_path).unwrap(), "Updated!");
    }

    #[test]
    fn file_lock_timeout_returns_lock_failed() {
        let temp_dir = TempDir::new().unwrap();
        let lock_path = temp_dir.path().join("timeout.lock");

        let _lock = FileLock::acquire(&lock_path, 1000).unwrap();
        let result = FileLock::acquire(&lock_path, 50);
        assert!(matches!(result, Err(Error::LockFailed(_))));
    }

    #[test]
    fn stress_single_writer_per_key() {
        let table = Arc::new(LockTable::new());
        let id = Uuid::new_v4();

        let threads = 12;
        let barrier = Arc::new(Barrier::new(threads));
        let in_lock = Arc::new(AtomicUsize::new(0));
        let max_concurrent = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::with_capacity(threads);
        for _ in 0..threads {
            let table = Arc::clone(&table);
            let barrier = Arc::clone(&barrier);
            let in_lock = Arc::clone(&in_lock);
            let max_concurrent = Arc::clone(&max_concurrent);

            handles.push(thread::spawn(move || {
                barrier.wait();
                let _guard = table.write(id, Duration::from_secs(5)).unwrap();

                let current = in_lock.fetch_add(1, Ordering::SeqCst) + 1;
                let _ = max_concurrent.fetch_max(current, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(5));
                in_lock.fetch_sub(1, Ordering::SeqCst);
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(max_concurrent.load(Ordering::SeqCst), 1);
        assert_eq!(table.active_keys(), 0);
    }

    #[test]
    fn distinct_keys_do_not_contend() {
        let table = LockTable::new();
        let first = table.write(Uuid::new_v4(), Duration::from_millis(50)).unwrap();
        let second = table.write(Uuid::new_v4(), Duration::from_millis(50)).unwrap();
        assert_eq!(table.active_keys(), 2);
        drop(first);
        drop(second);
        assert_eq!(table.active_keys(), 0);
    }

    #[test]
    fn readers_share_and_exclude_writers() {
        let table = LockTable::new();
        let id = Uuid::new_v4();

        let r1 = table.read(id, Duration::from_millis(50)).unwrap();
        let r2 = table.read(id, Duration::from_millis(50)).unwrap();
        assert_eq!(r1.mode(), LockMode::Shared);

        let blocked = table.write(id, Duration::from_millis(30));
        assert!(matches!(blocked, Err(Error::LockTimeout(got)) if got == id));

        drop(r1);
        drop(r2);
        let writer = table.write(id, Duration::from_millis(50)).unwrap();
        assert!(matches!(
            table.read(id, Duration::from_millis(30)),
            Err(Error::LockTimeout(_))
        ));
        drop(writer);
        assert_eq!(table.active_keys(), 0);
    }

    #[test]
    fn waiting_writer_is_granted_after_release() {
        let table = Arc::new(LockTable::new());
        let id = Uuid::new_v4();
        let guard = table.write(id, Duration::from_millis(50)).unwrap();

        let waiter = {
            let table = Arc::clone(&table);
            thread::spawn(move || table.write(id, Duration::from_secs(2)).map(|g| g.id()))
        };

        thread::sleep(Duration::from_millis(20));
        drop(guard);
        assert_eq!(waiter.join().unwrap().unwrap(), id);
    }
}
