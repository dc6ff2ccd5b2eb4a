use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The namespace file sinks create, fill and rename their files in.
///
/// Names are plain file names relative to the directory, never paths.
pub trait Directory: Clone {
    /// The writable handle returned by [`create_new`](Directory::create_new).
    type File: Write;

    /// Whether an entry called `name` exists.
    fn exists(&self, name: &str) -> io::Result<bool>;

    /// Creates `name` for writing, failing with [`io::ErrorKind::AlreadyExists`]
    /// if it is already there.
    fn create_new(&self, name: &str) -> io::Result<Self::File>;

    /// Renames `from` to `to`, replacing `to` if it exists.
    fn rename(&self, from: &str, to: &str) -> io::Result<()>;

    /// Deletes the entry `name`.
    fn remove(&self, name: &str) -> io::Result<()>;
}

/// A directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct DiskDirectory {
    root: PathBuf,
}

impl DiskDirectory {
    /// Uses the existing directory `root`. Nothing is created up front.
    pub fn new<P: Into<PathBuf>>(root: P) -> DiskDirectory {
        DiskDirectory { root: root.into() }
    }

    /// The directory uploads are stored in.
    pub fn path(&self) -> &Path {
        &self.root
    }
}

impl Directory for DiskDirectory {
    type File = BufWriter<File>;

    fn exists(&self, name: &str) -> io::Result<bool> {
        self.root.join(name).try_exists()
    }

    fn create_new(&self, name: &str) -> io::Result<Self::File> {
        let file = OpenOptions::new().write(true).create_new(true).open(self.root.join(name))?;
        Ok(BufWriter::new(file))
    }

    fn rename(&self, from: &str, to: &str) -> io::Result<()> {
        fs::rename(self.root.join(from), self.root.join(to))
    }

    fn remove(&self, name: &str) -> io::Result<()> {
        fs::remove_file(self.root.join(name))
    }
}

/// A directory kept entirely in memory.
///
/// Clones share the same entries, which makes it handy for tests and fuzzing.
#[derive(Debug, Clone)]
pub struct MemoryDirectory {
    files: Arc<spin::Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryDirectory {
    /// Creates an empty directory.
    pub fn new() -> MemoryDirectory {
        MemoryDirectory {
            files: Arc::new(spin::Mutex::new(HashMap::new())),
        }
    }

    /// Returns a copy of the contents stored under `name`.
    pub fn get(&self, name: &str) -> Option<Vec<u8>> {
        self.files.lock().get(name).cloned()
    }

    /// Stores `contents` under `name`, replacing any existing entry.
    pub fn insert<N: Into<String>>(&self, name: N, contents: Vec<u8>) {
        self.files.lock().insert(name.into(), contents);
    }

    /// Names of all entries, sorted.
    pub fn file_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.files.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of entries, temporary files included.
    pub fn len(&self) -> usize {
        self.files.lock().len()
    }

    /// Whether there are no entries at all.
    pub fn is_empty(&self) -> bool {
        self.files.lock().is_empty()
    }
}

impl Default for MemoryDirectory {
    fn default() -> Self {
        MemoryDirectory::new()
    }
}

/// A writable handle onto one [`MemoryDirectory`] entry.
#[derive(Debug)]
pub struct MemoryFile {
    files: Arc<spin::Mutex<HashMap<String, Vec<u8>>>>,
    name: String,
}

impl Write for MemoryFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut files = self.files.lock();
        let contents = files
            .get_mut(&self.name)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("'{}' no longer exists", self.name)))?;
        contents.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Directory for MemoryDirectory {
    type File = MemoryFile;

    fn exists(&self, name: &str) -> io::Result<bool> {
        Ok(self.files.lock().contains_key(name))
    }

    fn create_new(&self, name: &str) -> io::Result<Self::File> {
        let mut files = self.files.lock();
        if files.contains_key(name) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("'{}' already exists", name),
            ));
        }
        files.insert(name.to_owned(), Vec::new());

        Ok(MemoryFile {
            files: Arc::clone(&self.files),
            name: name.to_owned(),
        })
    }

    fn rename(&self, from: &str, to: &str) -> io::Result<()> {
        let mut files = self.files.lock();
        let contents = files
            .remove(from)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("'{}' does not exist", from)))?;
        files.insert(to.to_owned(), contents);
        Ok(())
    }

    fn remove(&self, name: &str) -> io::Result<()> {
        self.files
            .lock()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("'{}' does not exist", name)))
    }
}
