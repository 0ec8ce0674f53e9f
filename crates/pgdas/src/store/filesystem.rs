use std::fs::{self, File};
use std::io::{self, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::warn;

use super::{InsertOutcome, RecordRepository, RepositoryError, StoredRecord};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// One pretty-printed JSON document per record under `root`. Every write
/// lands in a synced temp file first; inserts claim the id with a hard link,
/// overwrites with a rename, so a record path only ever holds a complete
/// document.
#[derive(Debug)]
pub struct FileSystemRepository<R> {
    root: PathBuf,
    _records: PhantomData<fn() -> R>,
}

impl<R> FileSystemRepository<R> {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, RepositoryError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|err| unavailable(&root, err))?;
        Ok(Self {
            root,
            _records: PhantomData,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.root.join(format!("{}.json", file_stem(id)))
    }

    /// Hidden sibling of the record file, unique per process and call.
    fn scratch_path(&self, id: &str, suffix: &str) -> PathBuf {
        self.root.join(format!(
            ".{}.{}.{}.{suffix}",
            file_stem(id),
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ))
    }
}

impl<R: StoredRecord> FileSystemRepository<R> {
    fn encode(record: &R) -> Result<Vec<u8>, RepositoryError> {
        serde_json::to_vec_pretty(record).map_err(|err| RepositoryError::Corrupt {
            id: record.record_id().to_string(),
            message: err.to_string(),
        })
    }

    fn stage(&self, record: &R) -> Result<PathBuf, RepositoryError> {
        let bytes = Self::encode(record)?;
        let temp = self.scratch_path(record.record_id(), "tmp");
        let written = File::create(&temp)
            .and_then(|mut file| file.write_all(&bytes).and_then(|_| file.sync_all()));
        if let Err(err) = written {
            let _ = fs::remove_file(&temp);
            return Err(unavailable(&temp, err));
        }
        Ok(temp)
    }

    fn write_atomically(&self, record: &R) -> Result<(), RepositoryError> {
        let target = self.path_for(record.record_id());
        let temp = self.stage(record)?;
        fs::rename(&temp, &target).map_err(|err| {
            let _ = fs::remove_file(&temp);
            unavailable(&target, err)
        })
    }

    /// Links `temp` to `target`. A target that exists but cannot be decoded
    /// was left by an interrupted writer and holds no record, so it is moved
    /// aside and the claim retried once.
    fn claim(&self, temp: &Path, target: &Path, id: &str) -> Result<InsertOutcome, RepositoryError> {
        match fs::hard_link(temp, target) {
            Ok(()) => return Ok(InsertOutcome::Inserted),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {}
            Err(err) => return Err(unavailable(target, err)),
        }

        match self.read(target, id) {
            Ok(Some(_)) => return Ok(InsertOutcome::AlreadyExists),
            Ok(None) => {}
            Err(RepositoryError::Corrupt { message, .. }) => {
                let aside = self.scratch_path(id, "corrupt");
                warn!(id, error = %message, moved_to = %aside.display(), "replacing unreadable record");
                match fs::rename(target, &aside) {
                    Ok(()) => {}
                    Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                    Err(err) => return Err(unavailable(target, err)),
                }
            }
            Err(err) => return Err(err),
        }

        match fs::hard_link(temp, target) {
            Ok(()) => Ok(InsertOutcome::Inserted),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => Ok(InsertOutcome::AlreadyExists),
            Err(err) => Err(unavailable(target, err)),
        }
    }

    fn read(&self, path: &Path, id: &str) -> Result<Option<R>, RepositoryError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(unavailable(path, err)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|err| RepositoryError::Corrupt {
                id: id.to_string(),
                message: err.to_string(),
            })
    }
}

impl<R: StoredRecord> RecordRepository<R> for FileSystemRepository<R> {
    fn insert_new(&self, record: R) -> Result<InsertOutcome, RepositoryError> {
        let id = record.record_id();
        let target = self.path_for(id);
        let temp = self.stage(&record)?;
        let outcome = self.claim(&temp, &target, id);
        let _ = fs::remove_file(&temp);
        outcome
    }

    fn replace(&self, record: R) -> Result<(), RepositoryError> {
        self.write_atomically(&record)
    }

    fn update(&self, record: R) -> Result<(), RepositoryError> {
        if !self.path_for(record.record_id()).exists() {
            return Err(RepositoryError::NotFound(record.record_id().to_string()));
        }
        self.write_atomically(&record)
    }

    fn fetch(&self, id: &str) -> Result<Option<R>, RepositoryError> {
        self.read(&self.path_for(id), id)
    }
}

/// Record id reduced to characters that are safe in a file name.
pub(crate) fn file_stem(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn unavailable(path: &Path, err: io::Error) -> RepositoryError {
    RepositoryError::Unavailable(format!("{}: {err}", path.display()))
}
