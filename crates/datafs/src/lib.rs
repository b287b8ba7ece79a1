//! A uniform interface over heterogeneous data stores.
//!
//! A [`DataFs`] reads and writes named data objects, enumerates them, and
//! (where the backend allows it) attaches metadata to them.  What a store can
//! do is declared up front by its backend as a [`Capacity`]; anything outside
//! of it fails with [`DataFsError::Unsupported`] before touching storage.
//!
//! # Example
//!
//! ```no_run
//! use std::io::{Read, Write};
//!
//! use datafs::{LocalFs, OpenMode};
//!
//! let store = LocalFs::open_store("/srv/data", true)?;
//!
//! let mut file = store.open("reports/today.csv", OpenMode::Write)?;
//! file.write_all(b"a,b\n1,2\n")?;
//! file.close()?;
//!
//! for name in store.iter_names()? {
//!     println!("{}", name?);
//! }
//!
//! let mut contents = String::new();
//! store.open("reports/today.csv", OpenMode::Read)?.read_to_string(&mut contents)?;
//! store.close()?;
//! # Ok::<(), datafs::DataFsError>(())
//! ```
//!
//! # Handles
//!
//! Every [`DataFile`] returned by [`DataFs::open`] is tracked by its store.
//! Closing (or dropping) the store closes all handles still open on it;
//! further I/O through such a handle fails.

pub mod active;
pub mod capacity;
pub mod config;
pub mod datafs;
pub mod error;
pub mod local;
pub mod name;
pub mod util;


pub use active::{ActiveFiles, DataFile, DataStream, HandleId};
pub use capacity::{Capability, Capacity};
pub use config::{open_store, StoreConfig};
pub use datafs::{Backend, DataFs, LifecycleState, Metadata, Names, OpenMode};
pub use error::{DataFsError, Result};
pub use local::LocalFs;
