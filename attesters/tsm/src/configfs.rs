//! Linux configfs-tsm backend
//!
//! A report is produced by creating a directory under the report root,
//! writing the request attributes into it and reading the blobs back. The
//! kernel bumps `generation` on every write, so an unchanged generation
//! across the reads proves nobody else reused the entry meanwhile.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::errors::{Result, TsmError};
use crate::report::{ReportClient, ReportRequest, ReportResponse};

pub const DEFAULT_REPORT_ROOT: &str = "/sys/kernel/config/tsm/report";

static ENTRY_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone)]
pub struct LinuxTsm {
    root: PathBuf,
}

impl Default for LinuxTsm {
    fn default() -> Self {
        Self::new(DEFAULT_REPORT_ROOT)
    }
}

impl LinuxTsm {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// A report entry, removed on drop
struct Entry {
    path: PathBuf,
}

impl Entry {
    fn create(root: &Path) -> Result<Self> {
        let name = format!(
            "ratsd-{}-{}",
            std::process::id(),
            ENTRY_COUNTER.fetch_add(1, Ordering::Relaxed)
        );
        let path = root.join(name);
        std::fs::create_dir(&path).map_err(|source| TsmError::CreateEntry {
            path: path.clone(),
            source,
        })?;
        Ok(Self { path })
    }

    fn write(&self, attribute: &'static str, value: &[u8]) -> Result<()> {
        std::fs::write(self.path.join(attribute), value)
            .map_err(|source| TsmError::Write { attribute, source })
    }

    fn read(&self, attribute: &'static str) -> Result<Vec<u8>> {
        std::fs::read(self.path.join(attribute))
            .map_err(|source| TsmError::Read { attribute, source })
    }

    /// Attributes some providers do not expose
    fn read_optional(&self, attribute: &'static str) -> Result<Option<Vec<u8>>> {
        match std::fs::read(self.path.join(attribute)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(TsmError::Read { attribute, source }),
        }
    }

    fn generation(&self) -> Result<u64> {
        let raw = self.read("generation")?;
        let text = String::from_utf8_lossy(&raw);
        text.trim()
            .parse()
            .map_err(|_| TsmError::InvalidGeneration(text.trim().to_string()))
    }
}

impl Drop for Entry {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to remove report entry");
        }
    }
}

fn text(raw: Vec<u8>) -> String {
    String::from_utf8_lossy(&raw).into_owned()
}

impl ReportClient for LinuxTsm {
    fn available(&self) -> Result<()> {
        if self.root.is_dir() {
            Ok(())
        } else {
            Err(TsmError::Unavailable(self.root.clone()))
        }
    }

    fn get_report(&self, request: &ReportRequest) -> Result<ReportResponse> {
        self.available()?;
        let entry = Entry::create(&self.root)?;

        if request.privilege_level > 0 {
            entry.write("privlevel", request.privilege_level.to_string().as_bytes())?;
        }
        entry.write("inblob", &request.in_blob)?;

        let expected = entry.generation()?;

        let out_blob = entry.read("outblob")?;
        let aux_blob = if request.get_aux_blob {
            entry.read_optional("auxblob")?.unwrap_or_default()
        } else {
            Vec::new()
        };
        let manifest_blob = entry.read_optional("manifestblob")?;
        let provider = text(entry.read("provider")?);
        let service_provider = entry.read_optional("service_provider")?.map(text);

        let got = entry.generation()?;
        if got != expected {
            return Err(TsmError::GenerationChanged { expected, got });
        }

        tracing::debug!(
            provider = %provider.trim_end(),
            outblob_len = out_blob.len(),
            auxblob_len = aux_blob.len(),
            "TSM report generated"
        );

        Ok(ReportResponse {
            provider,
            service_provider,
            out_blob,
            aux_blob,
            manifest_blob,
        })
    }
}
