use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use super::{KeyStorage, StorageError};

/// One JSON file per record in a directory.
///
/// Writes go to a temporary file that is synced and then renamed over the
/// record, so a crash leaves either the old or the new value.
#[derive(Clone, Debug)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Use `dir` for records, creating it if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| io_error(&dir.display().to_string(), &e))?;
        Ok(Self { dir })
    }

    /// Directory holding the records.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, name: &str) -> Result<PathBuf, StorageError> {
        let valid = !name.is_empty()
            && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        if !valid {
            return Err(StorageError::InvalidName { name: name.to_string() });
        }
        Ok(self.dir.join(format!("{name}.json")))
    }
}

impl KeyStorage for FileStorage {
    fn load(&self, name: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.path(name)?) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(name, &e)),
        }
    }

    fn store(&self, name: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path(name)?;
        let tmp = path.with_extension("json.tmp");

        let write = || -> io::Result<()> {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(value.as_bytes())?;
            file.sync_all()?;
            fs::rename(&tmp, &path)
        };

        write().map_err(|e| io_error(name, &e))
    }

    fn remove(&self, name: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.path(name)?) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(name, &e)),
        }
    }
}

fn io_error(name: &str, err: &io::Error) -> StorageError {
    StorageError::Io { name: name.to_string(), reason: err.to_string() }
}
