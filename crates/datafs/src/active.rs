//! Tracking of open file handles.
//!
//! Every stream a backend opens is wrapped in a [`DataFile`] and registered in
//! the owning store's [`ActiveFiles`] before it reaches the caller.  The store
//! sweeps the registry when it closes, so a handle the caller forgot about is
//! still flushed and released.
//!
//! The caller and the registry share each stream through a slot.  Whoever
//! closes first takes the stream out of the slot; the other side then finds it
//! empty.  I/O through a [`DataFile`] whose slot has been emptied fails with an
//! [`std::io::Error`] instead of touching a released stream.
//!
//! Lock order is registry first, slot second.  A handle closing itself
//! releases its slot before deregistering.

use std::{
    collections::HashMap,
    fmt,
    io::{self, Read, Seek, SeekFrom, Write},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError, Weak,
    },
};

use log::{trace, warn};

use crate::{
    datafs::OpenMode,
    error::{DataFsError, Result},
};

/// Identifies a handle within one [`ActiveFiles`] registry.
pub type HandleId = u64;

/// A byte stream produced by a backend.
///
/// Anything seekable that can be read and written qualifies; the mode checks
/// happen in [`DataFile`], so a backend may hand out e.g. a read-only
/// [`std::fs::File`] for [`OpenMode::Read`].
pub trait DataStream: Read + Write + Seek + Send {}

impl<T: Read + Write + Seek + Send> DataStream for T {}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct HandleSlot {
    id: HandleId,
    name: String,
    mode: OpenMode,
    stream: Mutex<Option<Box<dyn DataStream>>>,
}

impl HandleSlot {
    /// Flush and release the stream.  Returns `Ok(false)` if it was already released.
    ///
    /// The stream is dropped even if the flush fails.
    fn close(&self) -> io::Result<bool> {
        let stream = lock(&self.stream).take();
        match stream {
            Some(mut stream) => {
                trace!("closing handle {} ({:?})", self.id, self.name);
                stream.flush()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[derive(Default)]
struct Registry {
    handles: Mutex<HashMap<HandleId, Arc<HandleSlot>>>,
    next_id: AtomicU64,
}

/// The set of handles currently open on a store.
#[derive(Default)]
pub struct ActiveFiles {
    registry: Arc<Registry>,
}

impl fmt::Debug for ActiveFiles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveFiles")
            .field("open", &self.len())
            .finish()
    }
}

impl ActiveFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly opened stream and return the handle for it.
    pub fn add(&self, stream: Box<dyn DataStream>, name: &str, mode: OpenMode) -> DataFile {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        let slot = Arc::new(HandleSlot {
            id,
            name: name.to_string(),
            mode,
            stream: Mutex::new(Some(stream)),
        });

        lock(&self.registry.handles).insert(id, Arc::clone(&slot));
        trace!("registered handle {id} for {name:?} ({mode})");

        DataFile {
            slot,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Close every tracked handle and empty the registry.
    ///
    /// A failing handle does not stop the others from being closed.  All
    /// failures are logged and returned together as
    /// [`DataFsError::CloseFailed`].
    pub fn close_all(&self) -> Result<()> {
        let mut slots: Vec<_> = lock(&self.registry.handles)
            .drain()
            .map(|(_, slot)| slot)
            .collect();
        slots.sort_by_key(|slot| slot.id);

        let mut failures = Vec::new();
        for slot in slots {
            if let Err(err) = slot.close() {
                warn!("failed to close handle {} ({:?}): {err}", slot.id, slot.name);
                failures.push((slot.name.clone(), err));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(DataFsError::CloseFailed(failures))
        }
    }

    /// Number of handles currently tracked.
    pub fn len(&self) -> usize {
        lock(&self.registry.handles).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the handle with the given id is still tracked.
    pub fn contains(&self, id: HandleId) -> bool {
        lock(&self.registry.handles).contains_key(&id)
    }
}

/// An open object in a store.
///
/// Reads, writes and seeks go to the backend stream.  Closing the handle
/// (explicitly via [`DataFile::close`], or by dropping it) flushes the stream
/// and removes the handle from its store's registry.  Once the owning store
/// has been closed, every I/O call fails.
pub struct DataFile {
    slot: Arc<HandleSlot>,
    registry: Weak<Registry>,
}

impl fmt::Debug for DataFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataFile")
            .field("id", &self.slot.id)
            .field("name", &self.slot.name)
            .field("mode", &self.slot.mode)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl DataFile {
    pub fn id(&self) -> HandleId {
        self.slot.id
    }

    /// The object name this handle was opened with.
    pub fn name(&self) -> &str {
        &self.slot.name
    }

    pub fn mode(&self) -> OpenMode {
        self.slot.mode
    }

    /// True once the handle was closed, either by the caller or by its store.
    pub fn is_closed(&self) -> bool {
        lock(&self.slot.stream).is_none()
    }

    /// Flush and release the underlying stream.
    ///
    /// Closing twice is a no-op.  The stream is released even if the flush
    /// fails; the flush error is returned.
    pub fn close(&mut self) -> io::Result<()> {
        let result = self.slot.close();
        self.deregister();
        result.map(|_| ())
    }

    fn deregister(&self) {
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry.handles).remove(&self.slot.id);
        }
    }

    fn require(&self, mode: OpenMode) -> io::Result<()> {
        if self.slot.mode == mode {
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("{:?} was opened for {}", self.slot.name, self.slot.mode),
            ))
        }
    }

    fn with_stream<T>(
        &self,
        op: impl FnOnce(&mut dyn DataStream) -> io::Result<T>,
    ) -> io::Result<T> {
        match lock(&self.slot.stream).as_mut() {
            Some(stream) => op(stream.as_mut()),
            None => Err(io::Error::other("handle is closed")),
        }
    }
}

impl Read for DataFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.require(OpenMode::Read)?;
        self.with_stream(|stream| stream.read(buf))
    }
}

impl Write for DataFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.require(OpenMode::Write)?;
        self.with_stream(|stream| stream.write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.slot.mode {
            OpenMode::Read => self.with_stream(|_| Ok(())),
            OpenMode::Write => self.with_stream(|stream| stream.flush()),
        }
    }
}

impl Seek for DataFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.with_stream(|stream| stream.seek(pos))
    }
}

impl Drop for DataFile {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!("error closing {:?} on drop: {err}", self.slot.name);
        }
    }
}
