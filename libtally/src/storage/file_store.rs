use crate::channel::Channel;
use crate::channel_id::ChannelId;
use crate::payment::Payment;
use crate::storage::{ChannelStore, StorageError};
use fd_lock::RwLock as FileLock;
use log::*;
use ron::ser::PrettyConfig;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

const CHANNELS_DIR: &str = "channels";
const HISTORY_DIR: &str = "history";
const JOURNAL_DIR: &str = "journal";
const TMP_EXTENSION: &str = "tmp";
const LOCK_FILE: &str = "LOCK";

/// A payment that has been journaled but not yet fully written.
#[derive(Serialize, Deserialize)]
struct PendingCommit {
    channel: Channel,
    payment: Payment,
}

/// Points in a payment commit where a test can make the store stop. `Crash*` points leave the files exactly as a
/// process kill would; `Fail*` points return an error and let the store clean up after itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FailPoint {
    CrashAfterJournal,
    CrashAfterHistory,
    CrashAfterChannel,
    FailHistoryAppend,
    FailRollback,
}

/// A file-based store for payment channels.
///
/// Layout under the root directory:
/// * `channels/<channel id>.ron` the channel record, e.g. `channels/TCH4a7024e7fd6f5c6a2d0131d12fd91ecd.ron`
/// * `history/<channel id>.ledger` the payment ledger, one compact RON payment per line
/// * `journal/<channel id>.ron` a payment commit in flight
///
/// Opening the store finishes any commit that left a journal behind. Only one `FileStore` at a time may hold a
/// directory; the exclusive lock on `LOCK` is released when the store is dropped.
///
/// Writes are synchronous and `fsync`ed. They run on the caller's task while the registry has the channel checked
/// out, so a slow disk holds up that channel and its worker thread.
pub struct FileStore {
    path: PathBuf,
    _lock: FileLock<File>,
    /// Set when a failed commit could not be undone. The files on disk no longer match what callers were told.
    needs_reopen: AtomicBool,
    #[cfg(test)]
    fail_points: std::sync::Mutex<Vec<FailPoint>>,
}

impl FileStore {
    /// Opens (creating if needed) a file store rooted at `path` and recovers any interrupted commits.
    ///
    /// # Arguments
    /// * `path` - The directory that holds the channel, history and journal folders.
    ///
    /// Fails with [`StorageError::Unavailable`] if another store, in this process or any other, has the directory
    /// open.
    pub fn new(path: PathBuf) -> Result<Self, StorageError> {
        for dir in [CHANNELS_DIR, HISTORY_DIR, JOURNAL_DIR] {
            fs::create_dir_all(path.join(dir))?;
        }
        let lock = lock_directory(&path)?;
        let store = Self {
            path,
            _lock: lock,
            needs_reopen: AtomicBool::new(false),
            #[cfg(test)]
            fail_points: std::sync::Mutex::new(Vec::new()),
        };
        store.recover()?;
        Ok(store)
    }

    /// Returns the path to the root directory of the store.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn channel_path(&self, id: &ChannelId) -> PathBuf {
        self.path.join(CHANNELS_DIR).join(format!("{}.ron", id.name()))
    }

    fn history_path(&self, id: &ChannelId) -> PathBuf {
        self.path.join(HISTORY_DIR).join(format!("{}.ledger", id.name()))
    }

    fn journal_path(&self, id: &ChannelId) -> PathBuf {
        self.path.join(JOURNAL_DIR).join(format!("{}.ron", id.name()))
    }

    fn recover(&self) -> Result<(), StorageError> {
        for dir in [CHANNELS_DIR, JOURNAL_DIR] {
            for path in files_with_extension(&self.path.join(dir), TMP_EXTENSION)? {
                warn!("Discarding incomplete write {}", path.display());
                fs::remove_file(&path)?;
            }
        }
        for path in files_with_extension(&self.path.join(HISTORY_DIR), "ledger")? {
            repair_ledger(&path)?;
        }
        let journals = files_with_extension(&self.path.join(JOURNAL_DIR), "ron")?;
        for path in &journals {
            self.replay_journal(path)?;
        }
        if !journals.is_empty() {
            info!("Recovered {} interrupted payment commit(s) in {}", journals.len(), self.path.display());
        }
        Ok(())
    }

    fn replay_journal(&self, path: &Path) -> Result<(), StorageError> {
        let pending: PendingCommit = read_ron(path)?;
        let id = pending.channel.id();
        let sequence = pending.payment.sequence;
        warn!("Rolling forward payment {} (sequence {sequence}) on channel {id}", pending.payment.id);
        let last = self.load_history(id)?.last().map(|p| p.sequence).unwrap_or(0);
        if last + 1 == sequence {
            append_ledger_line(&self.history_path(id), &pending.payment)?;
        } else if last != sequence {
            return Err(StorageError::Corrupt(format!(
                "journal for {id} holds sequence {sequence}, but the ledger ends at sequence {last}"
            )));
        }
        write_atomic(&self.channel_path(id), &to_pretty(&pending.channel)?)?;
        fs::remove_file(path)?;
        Ok(())
    }

    fn write_ledger_and_channel(&self, channel: &Channel, payment: &Payment) -> Result<(), StorageError> {
        self.check_fail_point(FailPoint::FailHistoryAppend)?;
        append_ledger_line(&self.history_path(channel.id()), payment)?;
        self.check_fail_point(FailPoint::CrashAfterHistory)?;
        write_atomic(&self.channel_path(channel.id()), &to_pretty(channel)?)?;
        self.check_fail_point(FailPoint::CrashAfterChannel)?;
        Ok(())
    }

    /// Undoes a commit that failed part way: the ledger is cut back to its old length and the journal removed.
    /// The channel record is only ever replaced by rename, so it still holds the previous version.
    ///
    /// If that fails too, the store stops accepting writes. The journal is rolled forward on the next open.
    fn roll_back(&self, journal: &Path, ledger: &Path, ledger_len: u64) {
        let result = self
            .check_fail_point(FailPoint::FailRollback)
            .and_then(|_| truncate(ledger, ledger_len))
            .and_then(|_| remove_if_exists(journal));
        if let Err(e) = result {
            error!("Could not roll back failed commit in {}. Refusing further writes. {e}", self.path.display());
            self.needs_reopen.store(true, Ordering::SeqCst);
        }
    }

    fn check_writable(&self) -> Result<(), StorageError> {
        if self.needs_reopen.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(format!(
                "{} must be reopened after a failed rollback",
                self.path.display()
            )));
        }
        Ok(())
    }

    #[cfg(test)]
    fn set_fail_point(&self, point: FailPoint) {
        if let Ok(mut points) = self.fail_points.lock() {
            points.push(point);
        }
    }

    #[cfg(test)]
    fn armed(&self, point: FailPoint) -> bool {
        self.fail_points.lock().map(|points| points.contains(&point)).unwrap_or(false)
    }

    #[cfg(not(test))]
    fn armed(&self, _point: FailPoint) -> bool {
        false
    }

    fn check_fail_point(&self, point: FailPoint) -> Result<(), StorageError> {
        if self.armed(point) {
            return Err(StorageError::Unavailable(format!("injected failure at {point:?}")));
        }
        Ok(())
    }

    fn crash_armed(&self) -> bool {
        [FailPoint::CrashAfterJournal, FailPoint::CrashAfterHistory, FailPoint::CrashAfterChannel]
            .into_iter()
            .any(|p| self.armed(p))
    }
}

impl ChannelStore for FileStore {
    fn save_channel(&self, channel: &Channel) -> Result<(), StorageError> {
        trace!("Saving channel {}", channel.id());
        self.check_writable()?;
        write_atomic(&self.channel_path(channel.id()), &to_pretty(channel)?)
    }

    fn commit_payment(&self, channel: &Channel, payment: &Payment) -> Result<(), StorageError> {
        self.check_writable()?;
        let id = channel.id();
        let ledger = self.history_path(id);
        let ledger_len = match fs::metadata(&ledger) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };
        let journal = self.journal_path(id);
        let pending = PendingCommit { channel: channel.clone(), payment: payment.clone() };
        write_atomic(&journal, &to_pretty(&pending)?)?;
        self.check_fail_point(FailPoint::CrashAfterJournal)?;
        if let Err(e) = self.write_ledger_and_channel(channel, payment) {
            if !self.crash_armed() {
                self.roll_back(&journal, &ledger, ledger_len);
            }
            return Err(e);
        }
        // The payment is durable from here on. A journal left behind is replayed idempotently on the next open.
        if let Err(e) = fs::remove_file(&journal) {
            warn!("Could not remove journal {}: {e}", journal.display());
        }
        trace!("Committed payment {} (sequence {}) on channel {id}", payment.id, payment.sequence);
        Ok(())
    }

    fn load_channels(&self) -> Result<Vec<Channel>, StorageError> {
        let dir = self.path.join(CHANNELS_DIR);
        debug!("⚡️ Loading channels from {}", dir.display());
        let mut channels = files_with_extension(&dir, "ron")?
            .iter()
            .map(|path| read_ron::<Channel>(path))
            .collect::<Result<Vec<_>, _>>()?;
        channels.sort_by_key(|c| c.index());
        Ok(channels)
    }

    fn load_history(&self, channel_id: &ChannelId) -> Result<Vec<Payment>, StorageError> {
        let path = self.history_path(channel_id);
        let contents = match fs::read_to_string(&path) {
            Ok(s) => s,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut payments = Vec::new();
        for line in contents.lines().filter(|l| !l.trim().is_empty()) {
            let payment: Payment =
                ron::from_str(line).map_err(|source| StorageError::Deserialization { path: path.clone(), source })?;
            let expected = payments.len() as u64 + 1;
            if payment.sequence != expected {
                return Err(StorageError::Corrupt(format!(
                    "{} has sequence {} where {expected} was expected",
                    path.display(),
                    payment.sequence
                )));
            }
            payments.push(payment);
        }
        Ok(payments)
    }
}

/// Takes the directory's exclusive lock. The guard is forgotten so the lock lives as long as the file handle, which
/// the store keeps until it is dropped.
fn lock_directory(path: &Path) -> Result<FileLock<File>, StorageError> {
    let file = OpenOptions::new().create(true).truncate(false).write(true).open(path.join(LOCK_FILE))?;
    let mut lock = FileLock::new(file);
    match lock.try_write() {
        Ok(guard) => std::mem::forget(guard),
        Err(e) if e.kind() == ErrorKind::WouldBlock => {
            return Err(StorageError::Unavailable(format!("{} is in use by another channel store", path.display())));
        }
        Err(e) => return Err(e.into()),
    }
    debug!("Locked channel store at {}", path.display());
    Ok(lock)
}

fn to_pretty<T: Serialize>(value: &T) -> Result<String, StorageError> {
    let config = PrettyConfig::new().compact_arrays(true).compact_maps(true);
    Ok(ron::ser::to_string_pretty(value, config)?)
}

fn read_ron<T: DeserializeOwned>(path: &Path) -> Result<T, StorageError> {
    let val = fs::read_to_string(path)?;
    ron::from_str(&val).map_err(|source| StorageError::Deserialization { path: path.to_path_buf(), source })
}

/// Writes `contents` beside `path` and renames it into place, so readers see the old file or the new one.
fn write_atomic(path: &Path, contents: &str) -> Result<(), StorageError> {
    let tmp = path.with_extension(TMP_EXTENSION);
    let mut file = File::create(&tmp)?;
    file.write_all(contents.as_bytes())?;
    file.sync_all()?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn append_ledger_line(path: &Path, payment: &Payment) -> Result<(), StorageError> {
    let line = format!("{}\n", ron::to_string(payment)?);
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(line.as_bytes())?;
    file.sync_data()?;
    Ok(())
}

/// Cuts off a trailing line that was only partly written.
fn repair_ledger(path: &Path) -> Result<(), StorageError> {
    let contents = fs::read(path)?;
    if contents.is_empty() || contents.ends_with(b"\n") {
        return Ok(());
    }
    let keep = contents.iter().rposition(|b| *b == b'\n').map(|i| i + 1).unwrap_or(0);
    warn!("Truncating torn ledger line in {} ({} bytes dropped)", path.display(), contents.len() - keep);
    truncate(path, keep as u64)
}

fn truncate(path: &Path, len: u64) -> Result<(), StorageError> {
    match OpenOptions::new().write(true).open(path) {
        Ok(file) => {
            file.set_len(len)?;
            file.sync_all()?;
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn remove_if_exists(path: &Path) -> Result<(), StorageError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn files_with_extension(dir: &Path, extension: &str) -> Result<Vec<PathBuf>, StorageError> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|e| e == extension) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
