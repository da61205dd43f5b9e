//! Plugin discovery and the name → handle registry
//!
//! The loader scans one directory for `*.plugin` executables, optionally
//! checks each binary against a trusted SHA-256 table, starts it and keys
//! the resulting handle by the name the plugin reports for itself.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};

use crate::client::PluginClient;
use crate::contract::{SubAttester, SubAttesterId};
use crate::errors::{PluginError, Result};

pub const PLUGIN_EXTENSION: &str = "plugin";
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// A started plugin and where it came from
pub struct LoadedPlugin {
    pub path: PathBuf,
    pub id: SubAttesterId,
    pub client: Arc<PluginClient>,
}

pub struct PluginLoader {
    location: PathBuf,
    handshake_timeout: Duration,
    /// Secure mode when set: binary stem → expected SHA-256
    checksums: Option<HashMap<String, Vec<u8>>>,
    loaded: HashMap<String, LoadedPlugin>,
}

impl PluginLoader {
    pub fn new(location: impl Into<PathBuf>) -> Self {
        Self {
            location: location.into(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            checksums: None,
            loaded: HashMap::new(),
        }
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Register trusted checksums and switch the loader to secure mode.
    ///
    /// Keys are plugin file names without the `.plugin` extension; values
    /// are hex encoded SHA-256 digests.
    pub fn set_checksums<I, K, V>(&mut self, table: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        let mut checksums = HashMap::new();
        for (name, digest) in table {
            let name = name.into();
            let bytes = hex::decode(digest.as_ref().trim()).map_err(|e| {
                PluginError::InvalidChecksum {
                    name: name.clone(),
                    reason: e.to_string(),
                }
            })?;
            if bytes.len() != 32 {
                return Err(PluginError::InvalidChecksum {
                    name,
                    reason: format!("expected 32 bytes, got {}", bytes.len()),
                });
            }

            tracing::debug!(plugin = %name, checksum = %digest.as_ref(), "registered plugin checksum");
            checksums.insert(name, bytes);
        }

        self.checksums = Some(checksums);
        Ok(())
    }

    pub fn is_secure(&self) -> bool {
        self.checksums.is_some()
    }

    /// Candidate plugin binaries, sorted by path
    pub fn candidates(&self) -> Result<Vec<PathBuf>> {
        if self.location.as_os_str().is_empty() {
            return Err(PluginError::NotInitialized);
        }

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(&self.location)? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == PLUGIN_EXTENSION) {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    /// Start every plugin in the directory.
    ///
    /// Foreign executables that fail the handshake are skipped. Everything
    /// else (duplicate names, checksum failures, incompatible versions)
    /// stops the load and shuts down whatever was already started.
    pub async fn discover(&mut self) -> Result<()> {
        tracing::debug!(location = %self.location.display(), "discovering plugins");

        for path in self.candidates()? {
            if let Err(e) = self.load_one(&path).await {
                if let PluginError::UnknownPlugin(reason) = &e {
                    tracing::debug!(path = %path.display(), %reason, "skipping non-plugin executable");
                    continue;
                }
                self.close().await;
                return Err(e);
            }
        }

        Ok(())
    }

    async fn load_one(&mut self, path: &Path) -> Result<()> {
        if let Some(checksums) = &self.checksums {
            verify_checksum(checksums, path).await?;
        }

        let client = PluginClient::spawn(path, self.handshake_timeout).await?;

        let out = client.get_sub_attester_id().await;
        let id = match (out.status.result, out.sub_attester_id) {
            (true, Some(id)) => id,
            (_, _) => {
                client.shutdown().await;
                return Err(PluginError::Identity {
                    path: path.display().to_string(),
                    reason: if out.status.error.is_empty() {
                        "no identity returned".to_string()
                    } else {
                        out.status.error
                    },
                });
            }
        };

        if let Some(existing) = self.loaded.get(&id.name) {
            client.shutdown().await;
            return Err(PluginError::DuplicateName {
                name: id.name,
                first: existing.path.display().to_string(),
                second: path.display().to_string(),
            });
        }

        tracing::info!(
            attester = %id.name,
            version = %id.version,
            path = %path.display(),
            "loaded sub-attester"
        );
        self.loaded.insert(
            id.name.clone(),
            LoadedPlugin {
                path: path.to_path_buf(),
                id,
                client: Arc::new(client),
            },
        );
        Ok(())
    }

    /// Names of all loaded plugins, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.loaded.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn get(&self, name: &str) -> Option<&LoadedPlugin> {
        self.loaded.get(name)
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<dyn SubAttester>> {
        self.loaded
            .get(name)
            .map(|p| p.client.clone() as Arc<dyn SubAttester>)
            .ok_or_else(|| PluginError::NotFound(name.to_string()))
    }

    /// Stop every plugin process. The registry itself is left intact.
    pub async fn close(&self) {
        for plugin in self.loaded.values() {
            plugin.client.shutdown().await;
        }
    }
}

async fn verify_checksum(checksums: &HashMap<String, Vec<u8>>, path: &Path) -> Result<()> {
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let Some(expected) = checksums.get(&name) else {
        return Err(PluginError::UnregisteredPlugin {
            name,
            path: path.display().to_string(),
        });
    };

    let binary = tokio::fs::read(path).await?;
    let actual = Sha256::digest(&binary);
    if actual.as_slice() != expected.as_slice() {
        return Err(PluginError::ChecksumMismatch {
            name,
            path: path.display().to_string(),
        });
    }

    tracing::debug!(plugin = %name, "checksum verified");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_dot_plugin_files_are_candidates() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.plugin"), b"").unwrap();
        std::fs::write(dir.path().join("a.plugin"), b"").unwrap();
        std::fs::write(dir.path().join("README"), b"").unwrap();
        std::fs::create_dir(dir.path().join("dir.plugin")).unwrap();

        let loader = PluginLoader::new(dir.path());
        let names: Vec<_> = loader
            .candidates()
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.plugin", "b.plugin"]);
    }

    #[test]
    fn empty_location_is_not_initialized() {
        let loader = PluginLoader::new("");
        assert!(matches!(
            loader.candidates(),
            Err(PluginError::NotInitialized)
        ));
    }

    #[test]
    fn checksum_table_must_be_hex_sha256() {
        let mut loader = PluginLoader::new("/tmp");
        assert!(matches!(
            loader.set_checksums([("tsm", "zz")]),
            Err(PluginError::InvalidChecksum { .. })
        ));
        assert!(matches!(
            loader.set_checksums([("tsm", "abcd")]),
            Err(PluginError::InvalidChecksum { .. })
        ));
        assert!(!loader.is_secure());

        let digest = hex::encode(Sha256::digest(b"binary"));
        loader.set_checksums([("tsm", digest.as_str())]).unwrap();
        assert!(loader.is_secure());
    }

    #[tokio::test]
    async fn checksum_keyed_by_file_stem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tsm.plugin");
        std::fs::write(&path, b"binary").unwrap();

        let mut table = HashMap::new();
        table.insert("tsm".to_string(), Sha256::digest(b"binary").to_vec());
        verify_checksum(&table, &path).await.unwrap();

        table.insert("tsm".to_string(), Sha256::digest(b"other").to_vec());
        assert!(matches!(
            verify_checksum(&table, &path).await,
            Err(PluginError::ChecksumMismatch { .. })
        ));

        table.clear();
        assert!(matches!(
            verify_checksum(&table, &path).await,
            Err(PluginError::UnregisteredPlugin { .. })
        ));
    }

    #[test]
    fn lookup_of_unknown_name_fails() {
        let loader = PluginLoader::new("/tmp");
        let err = loader.lookup("nope").err().unwrap();
        assert_eq!(err.to_string(), "plugin nope not found");
    }
}
