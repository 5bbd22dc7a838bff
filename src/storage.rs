use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs::{self, File};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::types::{EventsDocument, MeasuresDocument, MessagesDocument};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON error in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A whole JSON file that is always loaded and saved as one unit.
pub trait Document: Serialize + DeserializeOwned + Default {
    const FILE_NAME: &'static str;
}

impl Document for EventsDocument {
    const FILE_NAME: &'static str = "events.json";
}

impl Document for MeasuresDocument {
    const FILE_NAME: &'static str = "massnahmen.json";
}

impl Document for MessagesDocument {
    const FILE_NAME: &'static str = "messages.json";
}

pub const SURVEY_FILE: &str = "table.csv";

/// File-backed document store rooted at the data directory.
///
/// Every call goes to disk; nothing is cached between requests.
#[derive(Clone, Debug)]
pub struct DocumentStore {
    data_dir: PathBuf,
}

impl DocumentStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn path_of<D: Document>(&self) -> PathBuf {
        self.data_dir.join(D::FILE_NAME)
    }

    pub fn survey_path(&self) -> PathBuf {
        self.data_dir.join(SURVEY_FILE)
    }

    /// Read a document. A missing or blank file yields `Ok(None)`.
    pub fn try_load<D: Document>(&self) -> Result<Option<D>, StorageError> {
        let path = self.path_of::<D>();
        let mut file = match File::open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StorageError::Io { path, source }),
        };
        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|source| StorageError::Io {
                path: path.clone(),
                source,
            })?;
        if contents.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|source| StorageError::Json { path, source })
    }

    /// Read a document, substituting the empty default for anything unreadable.
    pub fn load<D: Document>(&self) -> D {
        match self.try_load::<D>() {
            Ok(Some(doc)) => doc,
            Ok(None) => D::default(),
            Err(err) => {
                tracing::warn!("{err}; using empty {}", D::FILE_NAME);
                D::default()
            }
        }
    }

    /// Persist a document through a temporary file and an atomic rename so
    /// readers never observe a partially written file.
    pub fn save<D: Document>(&self, doc: &D) -> Result<(), StorageError> {
        let path = self.path_of::<D>();
        let io_err = |source| StorageError::Io {
            path: path.clone(),
            source,
        };

        fs::create_dir_all(&self.data_dir).map_err(io_err)?;
        let content = serde_json::to_string_pretty(doc).map_err(|source| StorageError::Json {
            path: path.clone(),
            source,
        })?;

        let temp = path.with_extension("json.tmp");
        let written = File::create(&temp).and_then(|mut f| {
            f.write_all(content.as_bytes())?;
            f.sync_all()?;
            drop(f);
            fs::rename(&temp, &path)
        });
        if let Err(source) = written {
            let _ = fs::remove_file(&temp);
            return Err(io_err(source));
        }
        tracing::debug!(file = %path.display(), "document saved");
        Ok(())
    }
}
