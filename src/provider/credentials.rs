//! Layered credential resolution
//!
//! Credentials are looked up in a TOML credential file first (a table
//! named after the provider, in a file named `.<provider>` searched in
//! the working directory and then the home directory), then in a
//! caller-supplied list of environment variables, first set wins.
//!
//! Resolution has no side effects and is cached per store instance, so
//! repeated lookups of the same key cost one underlying file/environment
//! probe per run.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::CredentialError;

/// Per-provider credential store with layered lookup and caching
#[derive(Debug)]
pub struct CredentialStore {
    provider: String,
    file_override: Option<PathBuf>,
    cache: Mutex<HashMap<String, String>>,
    lookups: AtomicU32,
}

impl CredentialStore {
    /// Create a store for `provider` (canonical lowercase name).
    ///
    /// `file_override` replaces the default credential file search with a
    /// single explicit path.
    pub fn new<S: Into<String>>(provider: S, file_override: Option<PathBuf>) -> Self {
        Self {
            provider: provider.into().to_lowercase(),
            file_override,
            cache: Mutex::new(HashMap::new()),
            lookups: AtomicU32::new(0),
        }
    }

    /// Provider name this store resolves for
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Resolve `key`, consulting the credential file then `candidates`.
    pub fn get(&self, key: &str, candidates: &[&str]) -> Result<String, CredentialError> {
        if let Some(hit) = self.cache.lock().get(key) {
            trace!(provider = %self.provider, key, "credential cache hit");
            return Ok(hit.clone());
        }

        self.lookups.fetch_add(1, Ordering::Relaxed);
        let value = self.lookup_file(key)?.or_else(|| Self::lookup_env(candidates));

        match value {
            Some(value) => {
                self.cache.lock().insert(key.to_string(), value.clone());
                debug!(provider = %self.provider, key, "credential resolved");
                Ok(value)
            }
            None => Err(CredentialError::MissingCredential {
                provider: self.provider.clone(),
                key: key.to_string(),
                candidates: candidates.iter().map(|c| c.to_string()).collect(),
            }),
        }
    }

    /// Resolve `key` and verify it is one of `allowed`.
    pub fn get_checked(
        &self,
        key: &str,
        candidates: &[&str],
        allowed: &[&str],
    ) -> Result<String, CredentialError> {
        let value = self.get(key, candidates)?;
        if !allowed.is_empty() && !allowed.contains(&value.as_str()) {
            return Err(CredentialError::InvalidCredential {
                provider: self.provider.clone(),
                key: key.to_string(),
                value,
                allowed: allowed.iter().map(|a| a.to_string()).collect(),
            });
        }
        Ok(value)
    }

    /// Count of underlying (non-cached) lookups performed so far
    pub fn lookup_count(&self) -> u32 {
        self.lookups.load(Ordering::Relaxed)
    }

    /// Candidate credential file paths, highest priority first
    fn candidate_files(&self) -> Vec<PathBuf> {
        if let Some(path) = &self.file_override {
            return vec![path.clone()];
        }
        let file_name = format!(".{}", self.provider);
        let mut paths = Vec::with_capacity(2);
        if let Ok(cwd) = std::env::current_dir() {
            paths.push(cwd.join(&file_name));
        }
        if let Some(home) = home_dir() {
            paths.push(home.join(&file_name));
        }
        paths
    }

    fn lookup_file(&self, key: &str) -> Result<Option<String>, CredentialError> {
        for path in self.candidate_files() {
            if !path.is_file() {
                continue;
            }
            if let Some(value) = self.read_key(&path, key)? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    fn read_key(&self, path: &Path, key: &str) -> Result<Option<String>, CredentialError> {
        let raw = std::fs::read_to_string(path).map_err(|e| CredentialError::MalformedFile {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let table: toml::Value =
            toml::from_str(&raw).map_err(|e| CredentialError::MalformedFile {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        let value = table
            .get(&self.provider)
            .and_then(|section| section.get(key))
            .and_then(toml::Value::as_str)
            .map(str::to_owned);
        Ok(value)
    }

    fn lookup_env(candidates: &[&str]) -> Option<String> {
        candidates
            .iter()
            .find_map(|name| std::env::var(name).ok().filter(|v| !v.is_empty()))
    }
}

/// The user's home directory, from the platform environment
fn home_dir() -> Option<PathBuf> {
    #[cfg(windows)]
    let var = "USERPROFILE";
    #[cfg(not(windows))]
    let var = "HOME";
    std::env::var_os(var).map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_credentials(dir: &tempfile::TempDir, provider: &str, body: &str) -> PathBuf {
        let path = dir.path().join(format!(".{provider}"));
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, "{body}").unwrap();
        path
    }

    #[test]
    fn test_file_lookup_wins_over_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_credentials(
            &dir,
            "saucelabs",
            "[saucelabs]\nusername = \"from-file\"\n",
        );
        let store = CredentialStore::new("saucelabs", Some(path));
        // Environment variable that would match is ignored: file wins
        let value = store.get("username", &["PATH"]).unwrap();
        assert_eq!(value, "from-file");
    }

    #[test]
    fn test_env_fallback_first_set_wins() {
        let store = CredentialStore::new("testingbot", None);
        // PATH is always set; an unset var before it is skipped
        let value = store
            .get("key", &["GRIDCAP_TEST_UNSET_VAR_XYZ", "PATH"])
            .unwrap();
        assert_eq!(value, std::env::var("PATH").unwrap());
    }

    #[test]
    fn test_missing_credential_names_all_sources() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".browserstack");
        let store = CredentialStore::new("browserstack", Some(path));
        let err = store
            .get("key", &["GRIDCAP_TEST_UNSET_A", "GRIDCAP_TEST_UNSET_B"])
            .unwrap_err();
        match err {
            CredentialError::MissingCredential {
                provider,
                key,
                candidates,
            } => {
                assert_eq!(provider, "browserstack");
                assert_eq!(key, "key");
                assert_eq!(
                    candidates,
                    vec!["GRIDCAP_TEST_UNSET_A", "GRIDCAP_TEST_UNSET_B"]
                );
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_resolution_is_cached() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_credentials(&dir, "saucelabs", "[saucelabs]\nkey = \"s3cret\"\n");
        let store = CredentialStore::new("saucelabs", Some(path));

        let first = store.get("key", &[]).unwrap();
        let second = store.get("key", &[]).unwrap();
        assert_eq!(first, second);
        assert_eq!(store.lookup_count(), 1);
    }

    #[test]
    fn test_allowed_value_check() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_credentials(
            &dir,
            "saucelabs",
            "[saucelabs]\nvisibility = \"everyone\"\n",
        );
        let store = CredentialStore::new("saucelabs", Some(path));
        let err = store
            .get_checked("visibility", &[], &["public", "team", "private"])
            .unwrap_err();
        assert!(matches!(err, CredentialError::InvalidCredential { .. }));
        assert!(err.to_string().contains("everyone"));
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_credentials(&dir, "saucelabs", "not [ valid toml");
        let store = CredentialStore::new("saucelabs", Some(path));
        let err = store.get("username", &[]).unwrap_err();
        assert!(matches!(err, CredentialError::MalformedFile { .. }));
    }

    #[test]
    fn test_section_scoped_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_credentials(
            &dir,
            "saucelabs",
            "[browserstack]\nusername = \"other\"\n\n[saucelabs]\nusername = \"mine\"\n",
        );
        let store = CredentialStore::new("saucelabs", Some(path));
        assert_eq!(store.get("username", &[]).unwrap(), "mine");
    }
}
