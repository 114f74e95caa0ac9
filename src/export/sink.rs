//! Where finished reports go.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::Result;

/// A finished, named PDF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportArtifact {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Receives finished reports; the equivalent of handing a file to the user
/// agent for download.
pub trait ArtifactSink: Send + Sync {
    fn save(&self, artifact: &ReportArtifact) -> Result<()>;
}

/// Writes reports into a directory, replacing any file of the same name.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, artifact: &ReportArtifact) -> PathBuf {
        self.dir.join(&artifact.filename)
    }
}

impl ArtifactSink for DirectorySink {
    fn save(&self, artifact: &ReportArtifact) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let dest = self.path_for(artifact);
        // Write beside the destination and rename so readers never see a partial file.
        let partial = self.dir.join(format!(".{}.part", artifact.filename));
        std::fs::write(&partial, &artifact.bytes)?;
        if let Err(e) = std::fs::rename(&partial, &dest) {
            let _ = std::fs::remove_file(&partial);
            return Err(e.into());
        }
        log::info!("saved {} ({} bytes)", dest.display(), artifact.bytes.len());
        Ok(())
    }
}

/// Keeps reports in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    saved: Mutex<Vec<ReportArtifact>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn artifacts(&self) -> Vec<ReportArtifact> {
        self.saved.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

impl ArtifactSink for MemorySink {
    fn save(&self, artifact: &ReportArtifact) -> Result<()> {
        self.saved
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(artifact.clone());
        Ok(())
    }
}
