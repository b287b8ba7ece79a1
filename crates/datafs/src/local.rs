//! A store backed by a directory on the local filesystem.
//!
//! Object names map directly onto paths below the root directory:
//!
//! ```text
//! root/
//! ├── a            # object "a"
//! └── b/
//!     └── c        # object "b/c"
//! ```
//!
//! Directories are created on demand when an object is written and are not
//! objects themselves.  Metadata is not supported.

use std::{
    fs::{File, OpenOptions},
    io::ErrorKind,
    path::{Component, Path, PathBuf},
};

use log::{debug, trace};

use crate::{
    active::DataStream,
    capacity::{Capability, Capacity},
    datafs::{Backend, DataFs, Names, OpenMode},
    error::{DataFsError, Result},
    util::{iter_files, makedirs},
};

/// A [`Backend`] rooted at a local directory.
#[derive(Debug, Clone)]
pub struct LocalFs {
    root_dir: PathBuf,
}

impl LocalFs {
    /// Create a backend rooted at `root`.
    ///
    /// The path is made absolute against the current directory.
    ///
    /// # Errors
    ///
    /// Returns [`DataFsError::Construction`] if the path does not exist or is
    /// not a directory.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let construction = |path: &Path, reason: String| DataFsError::Construction {
            path: path.to_path_buf(),
            reason,
        };

        let root_dir = std::path::absolute(root).map_err(|e| construction(root, e.to_string()))?;

        match std::fs::metadata(&root_dir) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Err(construction(&root_dir, "not a directory".to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(construction(&root_dir, "no such directory".to_string()))
            }
            Err(e) => return Err(construction(&root_dir, e.to_string())),
        }

        debug!("local store at {}", root_dir.display());
        Ok(Self { root_dir })
    }

    /// Create a backend rooted at `root` and wrap it in a [`DataFs`].
    pub fn open_store(root: impl AsRef<Path>, strict: bool) -> Result<DataFs> {
        Ok(DataFs::new(Self::new(root)?, strict))
    }

    /// The absolute root directory.
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    fn resolve(&self, name: &str) -> PathBuf {
        self.root_dir.join(name)
    }

    fn open_read(&self, name: &str, path: &Path) -> Result<File> {
        let file = File::open(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => DataFsError::NotFound(name.to_string()),
            _ => DataFsError::Io(e),
        })?;

        // a directory isn't an object, even though open(2) accepts it
        if file.metadata()?.is_dir() {
            return Err(DataFsError::NotFound(name.to_string()));
        }
        Ok(file)
    }

    fn open_write(&self, path: &Path) -> Result<File> {
        if let Some(parent) = path.parent() {
            makedirs(parent, true)?;
        }
        Ok(OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?)
    }
}

impl Backend for LocalFs {
    fn kind(&self) -> &'static str {
        "local"
    }

    fn capacity(&self) -> Capacity {
        Capacity::new([Capability::ReadData, Capability::WriteData])
    }

    fn iter_names(&self) -> Result<Names> {
        Ok(Box::new(
            iter_files(&self.root_dir).map(|item| item.map_err(DataFsError::from)),
        ))
    }

    // There is no way to pick names from a directory tree without walking it.
    fn sample_names(&self, _n: usize) -> Result<Names> {
        Err(DataFsError::unsupported("sample_names"))
    }

    fn open(&self, name: &str, mode: OpenMode) -> Result<Box<dyn DataStream>> {
        let path = self.resolve(name);
        trace!("open {} for {mode}", path.display());

        let file = match mode {
            OpenMode::Read => self.open_read(name, &path)?,
            OpenMode::Write => self.open_write(&path)?,
        };
        Ok(Box::new(file))
    }

    fn isfile(&self, name: &str) -> Result<bool> {
        Ok(self.resolve(name).is_file())
    }

    fn validate_name(&self, name: &str) -> Result<()> {
        if Path::new(name)
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        {
            Ok(())
        } else {
            Err(DataFsError::InvalidArgument(format!(
                "{name:?} does not stay below {}",
                self.root_dir.display()
            )))
        }
    }

    fn duplicate(&self) -> Result<Box<dyn Backend>> {
        Ok(Box::new(LocalFs::new(&self.root_dir)?))
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};

    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn test_construction() {
        let td = tempfile::tempdir().unwrap();
        let fs = LocalFs::new(td.path()).unwrap();
        assert!(fs.root_dir().is_absolute());
        assert_eq!(fs.root_dir(), td.path());

        std::fs::write(td.path().join("file"), b"").unwrap();
        for bad in [td.path().join("file"), td.path().join("missing")] {
            let err = LocalFs::new(&bad).unwrap_err();
            assert!(
                matches!(err, DataFsError::Construction { ref path, .. } if *path == bad),
                "{err:?}"
            );
        }
    }

    #[test]
    fn test_capacity() {
        let td = tempfile::tempdir().unwrap();
        let caps = LocalFs::new(td.path()).unwrap().capacity();
        assert_eq!(
            caps.iter().collect::<Vec<_>>(),
            vec![Capability::ReadData, Capability::WriteData]
        );
    }

    #[test]
    fn test_backend_read_write() {
        let td = tempfile::tempdir().unwrap();
        let fs = LocalFs::new(td.path()).unwrap();

        let mut w = fs.open("x/y.bin", OpenMode::Write).unwrap();
        w.write_all(b"payload").unwrap();
        drop(w);
        assert!(td.path().join("x").is_dir());

        let mut r = fs.open("x/y.bin", OpenMode::Read).unwrap();
        let mut buf = vec![];
        r.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"payload");

        assert!(fs.open("x", OpenMode::Read).err().unwrap().is_not_found());
        assert!(fs.isfile("x/y.bin").unwrap());
        assert!(!fs.isfile("x").unwrap());
    }

    #[test]
    fn test_validate_name() {
        let td = tempfile::tempdir().unwrap();
        let fs = LocalFs::new(td.path()).unwrap();
        fs.validate_name("a/b").unwrap();
        fs.validate_name("a/../b").unwrap_err();
        fs.validate_name("/abs").unwrap_err();
    }
}
