//! File-backed shared store.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use sss_common::{SssError, SssResult};

use crate::store::DataStore;

/// Default location of the shared data file.
pub const DEFAULT_DATA_PATH: &str = "/var/tmp/simple_stream_serverdata";

/// Stores the shared byte sequence in a single file.
///
/// The file is created by the first append and deleted by [`DataStore::remove`].
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Creates a store for `path` without touching the filesystem.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileStore { path: path.into() }
    }

    /// Returns the backing path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_error(&self, source: io::Error) -> SssError {
        SssError::StoreOpen {
            store: self.describe(),
            source,
        }
    }
}

impl Default for FileStore {
    fn default() -> Self {
        FileStore::new(DEFAULT_DATA_PATH)
    }
}

impl DataStore for FileStore {
    fn open_append(&self) -> SssResult<Box<dyn Write + Send + '_>> {
        let mut options = OpenOptions::new();
        options.create(true).append(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o644);
        }
        let file = options.open(&self.path).map_err(|e| self.open_error(e))?;
        Ok(Box::new(AppendFile {
            inner: BufWriter::new(file),
        }))
    }

    fn open_read(&self) -> SssResult<Box<dyn Read + Send + '_>> {
        match File::open(&self.path) {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Box::new(io::empty())),
            Err(e) => Err(self.open_error(e)),
        }
    }

    fn remove(&self) -> SssResult<bool> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(SssError::Cleanup {
                op: "remove data file",
                source,
            }),
        }
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }
}

/// Append handle that flushes buffered bytes before the file closes.
///
/// `BufWriter` would flush on drop too, but it swallows the error there.
struct AppendFile {
    inner: BufWriter<File>,
}

impl Write for AppendFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl Drop for AppendFile {
    fn drop(&mut self) {
        if let Err(err) = self.inner.flush() {
            tracing::error!(error = %err, "failed to flush data file on close");
        }
    }
}
