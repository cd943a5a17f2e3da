use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("io error writing {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("sink lock poisoned")]
    LockPoisoned,
}

/// Destination for rendered documents.
pub trait DocumentSink: Send + Sync {
    fn persist(&self, content: &str, filename: &str) -> Result<PathBuf, SinkError>;
}

/// Writes documents under one output directory, creating it on demand.
#[derive(Debug, Clone)]
pub struct FileSink {
    output_dir: PathBuf,
}

impl FileSink {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }
}

impl DocumentSink for FileSink {
    fn persist(&self, content: &str, filename: &str) -> Result<PathBuf, SinkError> {
        fs::create_dir_all(&self.output_dir).map_err(|source| SinkError::Io {
            path: self.output_dir.clone(),
            source,
        })?;
        let path = self.output_dir.join(filename);
        fs::write(&path, content).map_err(|source| SinkError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}

/// Keeps documents in memory, keyed by filename in write order.
#[derive(Debug, Default)]
pub struct MemorySink {
    documents: Mutex<Vec<(String, String)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn documents(&self) -> Vec<(String, String)> {
        self.documents
            .lock()
            .map(|documents| documents.clone())
            .unwrap_or_default()
    }

    pub fn document(&self, filename: &str) -> Option<String> {
        self.documents()
            .into_iter()
            .find(|(name, _)| name == filename)
            .map(|(_, content)| content)
    }
}

impl DocumentSink for MemorySink {
    fn persist(&self, content: &str, filename: &str) -> Result<PathBuf, SinkError> {
        let mut documents = self.documents.lock().map_err(|_| SinkError::LockPoisoned)?;
        documents.push((filename.to_owned(), content.to_owned()));
        Ok(PathBuf::from(filename))
    }
}
