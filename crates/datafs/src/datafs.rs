//! The store contract and its lifecycle.
//!
//! A store is a [`Backend`] wrapped in a [`DataFs`].  The backend implements
//! the storage-specific hooks; [`DataFs`] is the only type callers use, and it
//! runs every operation through the same sequence:
//!
//! 1. reject the call if the store has been closed
//! 2. reject the call if the backend lacks the required [`Capability`]
//! 3. in strict mode, validate names and metadata keys
//! 4. run [`Backend::init`] if this is the first operation
//! 5. call the backend hook
//!
//! Steps 1 to 3 happen before any I/O, so a rejected call leaves no trace.
//!
//! # Lifecycle
//!
//! ```text
//! Uninitialized --init()--> Initialized --close()--> Closed
//!       |                                              ^
//!       +-------------------close()--------------------+
//! ```
//!
//! `init()` and `close()` are both idempotent.  `init()` on a closed store
//! fails with [`DataFsError::IllegalState`], as does every other operation.
//! Dropping a [`DataFs`] closes it.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt, io,
    str::FromStr,
    sync::{Mutex, MutexGuard, PoisonError},
};

use log::{debug, warn};

use crate::{
    active::{ActiveFiles, DataFile, DataStream},
    capacity::{Capability, Capacity},
    error::{DataFsError, Result},
    name::{validate_meta_key, validate_name},
};

/// A lazily produced sequence of object names.
pub type Names = Box<dyn Iterator<Item = Result<String>> + Send>;

/// Metadata attached to an object.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// How an object is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpenMode {
    /// Read an existing object.
    Read,
    /// Create or truncate an object and write it.
    Write,
}

impl OpenMode {
    /// The capability a backend needs to open objects in this mode.
    pub fn capability(self) -> Capability {
        match self {
            OpenMode::Read => Capability::ReadData,
            OpenMode::Write => Capability::WriteData,
        }
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OpenMode::Read => "read",
            OpenMode::Write => "write",
        })
    }
}

impl FromStr for OpenMode {
    type Err = DataFsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "r" | "read" => Ok(OpenMode::Read),
            "w" | "write" => Ok(OpenMode::Write),
            other => Err(DataFsError::InvalidArgument(format!(
                "invalid open mode {other:?}"
            ))),
        }
    }
}

/// Where a store is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Initialized,
    Closed,
}

/// The storage-specific half of a store.
///
/// Implementations never need to check capabilities, lifecycle state or
/// strict-mode rules: [`DataFs`] does that before calling any hook.  The
/// default bodies of the optional hooks report the operation as unsupported.
pub trait Backend: Send + Sync {
    /// Short name of the backend kind, used in logs.
    fn kind(&self) -> &'static str;

    /// The capabilities this backend offers.  Must not change over the
    /// backend's lifetime.
    fn capacity(&self) -> Capacity;

    /// One-time setup, run before the first operation.
    fn init(&self) -> Result<()> {
        Ok(())
    }

    /// Teardown, run once when the store closes after a successful init.
    /// Open handles have already been closed at this point.
    fn close(&self) -> Result<()> {
        Ok(())
    }

    /// Enumerate every object name.  Each call starts a fresh enumeration.
    fn iter_names(&self) -> Result<Names>;

    /// Produce up to `n` names without necessarily enumerating everything.
    fn sample_names(&self, _n: usize) -> Result<Names> {
        Err(DataFsError::unsupported("sample_names"))
    }

    /// Open `name`.  For [`OpenMode::Write`], missing parent containers are
    /// created and the object is truncated.
    fn open(&self, name: &str, mode: OpenMode) -> Result<Box<dyn DataStream>>;

    /// True iff `name` exists as a leaf object.
    fn isfile(&self, name: &str) -> Result<bool>;

    fn list_meta(&self, _name: &str) -> Result<BTreeSet<String>> {
        Err(DataFsError::unsupported("list_meta"))
    }

    fn get_meta(&self, _name: &str, _keys: &[&str]) -> Result<Metadata> {
        Err(DataFsError::unsupported("get_meta"))
    }

    fn put_meta(&self, _name: &str, _meta: &Metadata) -> Result<()> {
        Err(DataFsError::unsupported("put_meta"))
    }

    fn clear_meta(&self, _name: &str) -> Result<()> {
        Err(DataFsError::unsupported("clear_meta"))
    }

    /// Backend-specific name checks, run only in strict mode and only after
    /// the generic checks passed.
    fn validate_name(&self, _name: &str) -> Result<()> {
        Ok(())
    }

    /// A fresh backend over the same storage configuration.
    fn duplicate(&self) -> Result<Box<dyn Backend>>;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A store: a backend plus lifecycle, capability and handle bookkeeping.
pub struct DataFs {
    backend: Box<dyn Backend>,
    strict: bool,
    capacity: Capacity,
    state: Mutex<LifecycleState>,
    active: ActiveFiles,
}

impl fmt::Debug for DataFs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataFs")
            .field("backend", &self.backend.kind())
            .field("strict", &self.strict)
            .field("capacity", &self.capacity)
            .field("state", &self.state())
            .field("active", &self.active)
            .finish()
    }
}

impl DataFs {
    /// Wrap `backend` in a new, uninitialized store.
    pub fn new(backend: impl Backend + 'static, strict: bool) -> Self {
        Self::from_boxed(Box::new(backend), strict)
    }

    pub fn from_boxed(backend: Box<dyn Backend>, strict: bool) -> Self {
        let capacity = backend.capacity();
        Self {
            backend,
            strict,
            capacity,
            state: Mutex::new(LifecycleState::Uninitialized),
            active: ActiveFiles::new(),
        }
    }

    pub fn strict(&self) -> bool {
        self.strict
    }

    pub fn capacity(&self) -> Capacity {
        self.capacity
    }

    /// The backend kind, e.g. `"local"`.
    pub fn kind(&self) -> &'static str {
        self.backend.kind()
    }

    pub fn state(&self) -> LifecycleState {
        *lock(&self.state)
    }

    pub fn is_closed(&self) -> bool {
        self.state() == LifecycleState::Closed
    }

    /// Number of handles opened on this store that are still open.
    pub fn active_files(&self) -> usize {
        self.active.len()
    }

    /// Initialize the store if it hasn't been yet.
    ///
    /// If the backend's setup fails the store stays uninitialized, and the
    /// next operation tries again.
    pub fn init(&self) -> Result<()> {
        let mut state = lock(&self.state);
        match *state {
            LifecycleState::Uninitialized => {
                self.backend.init()?;
                debug!("initialized {} store", self.backend.kind());
                *state = LifecycleState::Initialized;
                Ok(())
            }
            LifecycleState::Initialized => Ok(()),
            LifecycleState::Closed => Err(DataFsError::IllegalState(
                "cannot initialize a closed store".to_string(),
            )),
        }
    }

    /// Close every open handle and shut the store down.
    ///
    /// The store ends up closed even if some handles failed to close; those
    /// failures are returned as [`DataFsError::CloseFailed`].  If the backend's
    /// teardown fails as well, its error is appended to the same list.
    pub fn close(&self) -> Result<()> {
        let mut state = lock(&self.state);
        let previous = *state;
        if previous == LifecycleState::Closed {
            return Ok(());
        }
        *state = LifecycleState::Closed;

        let handles = self.active.close_all();
        let backend = match previous {
            LifecycleState::Initialized => self.backend.close(),
            _ => Ok(()),
        };
        debug!("closed {} store", self.backend.kind());

        match (handles, backend) {
            (Err(DataFsError::CloseFailed(mut failures)), Err(err)) => {
                let kind = self.backend.kind();
                warn!("error closing {kind} backend: {err}");
                failures.push((format!("<{kind} backend>"), io::Error::other(err)));
                Err(DataFsError::CloseFailed(failures))
            }
            (handles, backend) => handles.and(backend),
        }
    }

    /// Lifecycle and capability checks.  Neither touches the backend.
    fn admit(&self, operation: &'static str, capability: Option<Capability>) -> Result<()> {
        if self.is_closed() {
            return Err(DataFsError::IllegalState(format!(
                "{operation} called on a closed store"
            )));
        }
        if let Some(capability) = capability {
            if !self.capacity.has(capability) {
                return Err(DataFsError::missing(operation, capability));
            }
        }
        Ok(())
    }

    fn check_name(&self, name: &str) -> Result<()> {
        if self.strict {
            validate_name(name)?;
            self.backend.validate_name(name)?;
        }
        Ok(())
    }

    fn check_meta_keys<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> Result<()> {
        if self.strict {
            keys.into_iter().try_for_each(validate_meta_key)?;
        }
        Ok(())
    }

    /// Enumerate every object name in the store.
    pub fn iter_names(&self) -> Result<Names> {
        self.admit("iter_names", None)?;
        self.init()?;
        self.backend.iter_names()
    }

    /// Produce up to `n` object names, using the backend's sampling strategy.
    pub fn sample_names(&self, n: usize) -> Result<Names> {
        self.admit("sample_names", None)?;
        self.init()?;
        self.backend.sample_names(n)
    }

    /// Open the object `name`.
    ///
    /// The handle is tracked by this store and force-closed when the store
    /// closes.
    pub fn open(&self, name: &str, mode: OpenMode) -> Result<DataFile> {
        self.admit("open", Some(mode.capability()))?;
        self.check_name(name)?;
        self.init()?;

        let stream = self.backend.open(name, mode)?;
        self.track(stream, name, mode)
    }

    fn track(&self, stream: Box<dyn DataStream>, name: &str, mode: OpenMode) -> Result<DataFile> {
        let mut file = self.active.add(stream, name, mode);

        // A concurrent close() may have swept the registry before we added to it.
        if self.is_closed() {
            if let Err(err) = file.close() {
                warn!("error closing {name:?} after the store closed: {err}");
            }
            return Err(DataFsError::IllegalState(format!(
                "store closed while opening {name:?}"
            )));
        }
        Ok(file)
    }

    /// True iff `name` exists as an object.
    pub fn isfile(&self, name: &str) -> Result<bool> {
        self.admit("isfile", Some(Capability::ReadData))?;
        self.check_name(name)?;
        self.init()?;
        self.backend.isfile(name)
    }

    /// The metadata keys stored for `name`.
    pub fn list_meta(&self, name: &str) -> Result<BTreeSet<String>> {
        self.admit("list_meta", Some(Capability::ReadMeta))?;
        self.check_name(name)?;
        self.init()?;
        self.backend.list_meta(name)
    }

    /// The values of the requested metadata keys.  Keys without a stored
    /// value are omitted from the result.
    pub fn get_meta(&self, name: &str, keys: &[&str]) -> Result<Metadata> {
        self.admit("get_meta", Some(Capability::ReadMeta))?;
        self.check_name(name)?;
        self.check_meta_keys(keys.iter().copied())?;
        self.init()?;
        self.backend.get_meta(name, keys)
    }

    /// Store the given metadata for `name`, replacing values of existing keys.
    pub fn put_meta(&self, name: &str, meta: &Metadata) -> Result<()> {
        self.admit("put_meta", Some(Capability::WriteMeta))?;
        self.check_name(name)?;
        self.check_meta_keys(meta.keys().map(String::as_str))?;
        self.init()?;
        self.backend.put_meta(name, meta)
    }

    /// Remove all metadata stored for `name`.
    pub fn clear_meta(&self, name: &str) -> Result<()> {
        self.admit("clear_meta", Some(Capability::WriteMeta))?;
        self.check_name(name)?;
        self.init()?;
        self.backend.clear_meta(name)
    }

    /// A new, non-strict store over the same storage.
    ///
    /// The clone has its own lifecycle and its own handle registry; closing
    /// one does not affect the other.
    pub fn try_clone(&self) -> Result<DataFs> {
        Ok(DataFs::from_boxed(self.backend.duplicate()?, false))
    }
}

impl Drop for DataFs {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!("error closing {} store: {err}", self.backend.kind());
        }
    }
}
