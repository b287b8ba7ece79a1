//! Directory helpers used by the local backend.

use std::{
    ffi::OsStr,
    io::{Error, ErrorKind, Result},
    os::{fd::OwnedFd, unix::ffi::OsStrExt},
    path::{Path, PathBuf},
};

use rustix::{
    fs::{mkdirat, openat, statat, AtFlags, Dir, FileType, Mode, OFlags, CWD},
    io::Errno,
};

fn open_dir(dirfd: impl rustix::fd::AsFd, path: impl rustix::path::Arg) -> Result<OwnedFd> {
    Ok(openat(
        dirfd,
        path,
        OFlags::RDONLY | OFlags::DIRECTORY | OFlags::CLOEXEC,
        Mode::empty(),
    )?)
}

/// Read the entries of a directory, sorted by name, skipping `.` and `..`.
fn read_entries(fd: &OwnedFd) -> Result<Vec<(Vec<u8>, FileType)>> {
    let mut entries = Vec::new();
    for item in Dir::read_from(fd)? {
        let entry = item?;
        let name = entry.file_name().to_bytes();
        if name == b"." || name == b".." {
            continue;
        }
        entries.push((name.to_vec(), entry.file_type()));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(entries)
}

struct Frame {
    fd: OwnedFd,
    prefix: String,
    entries: std::vec::IntoIter<(Vec<u8>, FileType)>,
}

impl Frame {
    fn new(fd: OwnedFd, prefix: String) -> Result<Self> {
        let entries = read_entries(&fd)?.into_iter();
        Ok(Self {
            fd,
            prefix,
            entries,
        })
    }
}

/// Iterator returned by [`iter_files`].
pub struct IterFiles {
    root: Option<PathBuf>,
    stack: Vec<Frame>,
}

impl std::fmt::Debug for IterFiles {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IterFiles")
            .field("root", &self.root)
            .field("depth", &self.stack.len())
            .finish()
    }
}

/// Lazily enumerate every regular file below `root`, recursively.
///
/// Items are paths relative to `root`, joined with `/`.  Entries are visited
/// depth-first in byte order of their names, so two walks over an unchanged
/// tree produce the same sequence.  Symlinks are reported if they point at a
/// regular file; symlinked directories are not descended.
///
/// Errors (including a missing root) are yielded as items; the walk continues
/// past them where it can.  Names that aren't valid UTF-8 yield
/// [`ErrorKind::InvalidData`].
pub fn iter_files(root: impl AsRef<Path>) -> IterFiles {
    IterFiles {
        root: Some(root.as_ref().to_path_buf()),
        stack: Vec::new(),
    }
}

impl IterFiles {
    /// Work out what a directory entry really is.  Symlinks are followed so
    /// that links to regular files count as files.
    fn classify(dirfd: &OwnedFd, name: &OsStr, file_type: FileType) -> Result<FileType> {
        match file_type {
            FileType::Unknown => {
                let st = statat(dirfd, name, AtFlags::SYMLINK_NOFOLLOW)?;
                Self::classify(dirfd, name, FileType::from_raw_mode(st.st_mode))
            }
            FileType::Symlink => match statat(dirfd, name, AtFlags::empty()) {
                Ok(st) if FileType::from_raw_mode(st.st_mode) == FileType::RegularFile => {
                    Ok(FileType::RegularFile)
                }
                // dangling links and links to directories are skipped
                Ok(_) | Err(Errno::NOENT) | Err(Errno::LOOP) => Ok(FileType::Symlink),
                Err(err) => Err(err.into()),
            },
            other => Ok(other),
        }
    }
}

impl Iterator for IterFiles {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(root) = self.root.take() {
            match open_dir(CWD, &root).and_then(|fd| Frame::new(fd, String::new())) {
                Ok(frame) => self.stack.push(frame),
                Err(err) => return Some(Err(err)),
            }
        }

        loop {
            let frame = self.stack.last_mut()?;
            let Some((name, file_type)) = frame.entries.next() else {
                self.stack.pop();
                continue;
            };

            let os_name = OsStr::from_bytes(&name);
            let path = match std::str::from_utf8(&name) {
                Ok(name) => format!("{}{name}", frame.prefix),
                Err(_) => {
                    return Some(Err(Error::new(
                        ErrorKind::InvalidData,
                        format!("non UTF-8 file name {:?} in {:?}", os_name, frame.prefix),
                    )))
                }
            };

            match Self::classify(&frame.fd, os_name, file_type) {
                Ok(FileType::RegularFile) => return Some(Ok(path)),
                Ok(FileType::Directory) => {
                    match open_dir(&frame.fd, os_name).and_then(|fd| Frame::new(fd, path + "/")) {
                        Ok(child) => self.stack.push(child),
                        Err(err) => return Some(Err(err)),
                    }
                }
                Ok(_) => {}
                Err(err) => return Some(Err(err)),
            }
        }
    }
}

fn mkdir_parents(path: &Path) -> Result<()> {
    match mkdirat(CWD, path, Mode::from_raw_mode(0o777)) {
        Ok(()) => Ok(()),
        Err(Errno::EXIST) if path.is_dir() => Ok(()),
        Err(Errno::NOENT) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                mkdir_parents(parent)?;
            }
            match mkdirat(CWD, path, Mode::from_raw_mode(0o777)) {
                Ok(()) => Ok(()),
                // lost a race with someone else creating it
                Err(Errno::EXIST) if path.is_dir() => Ok(()),
                Err(err) => Err(err.into()),
            }
        }
        Err(err) => Err(err.into()),
    }
}

/// Create the directory `path` along with any missing parents.
///
/// If `path` already is a directory, that's an error of kind
/// [`ErrorKind::AlreadyExists`] unless `exist_ok` is set.  If it exists but is
/// something other than a directory, that's always an error.
pub fn makedirs(path: impl AsRef<Path>, exist_ok: bool) -> Result<()> {
    let path = path.as_ref();
    if path.as_os_str().is_empty() {
        return Ok(());
    }

    match std::fs::metadata(path) {
        Ok(meta) if meta.is_dir() => {
            if exist_ok {
                Ok(())
            } else {
                Err(Error::new(
                    ErrorKind::AlreadyExists,
                    format!("directory {} already exists", path.display()),
                ))
            }
        }
        Ok(_) => Err(Error::new(
            ErrorKind::AlreadyExists,
            format!("{} exists and is not a directory", path.display()),
        )),
        Err(err) if err.kind() == ErrorKind::NotFound => mkdir_parents(path),
        Err(err) => Err(err),
    }
}
