//! Persistence of measured path delays
//!
//! The file is a small JSON document. It is rewritten whenever a domain
//! reports a changed path delay, and read back at startup to seed the ports,
//! so a restarted system is usable before its first measurement completes.

use std::{collections::BTreeMap, io::ErrorKind, path::Path};

use gptp::{time::Duration, PathDelaySeeds};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum NvramError {
    #[error("io error on nvram file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid nvram file: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct StoredPathDelay {
    domain_number: u8,
    port: usize,
    delay_ns: i64,
}

#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct NvramFile {
    #[serde(default)]
    path_delay: Vec<StoredPathDelay>,
}

/// The path delays known at this point, by domain number and port index
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Nvram {
    delays: BTreeMap<(u8, usize), i64>,
}

impl Nvram {
    /// Read the file. A missing file is an empty nvram.
    pub fn load(path: &Path) -> Result<Self, NvramError> {
        let contents = match std::fs::read(path) {
            Ok(contents) => contents,
            Err(error) if error.kind() == ErrorKind::NotFound => {
                tracing::info!("No nvram file at {}, starting without", path.display());
                return Ok(Self::default());
            }
            Err(error) => return Err(error.into()),
        };

        let file: NvramFile = serde_json::from_slice(&contents)?;
        Ok(Nvram {
            delays: file
                .path_delay
                .into_iter()
                .map(|stored| ((stored.domain_number, stored.port), stored.delay_ns))
                .collect(),
        })
    }

    /// Atomically replace the file with the current contents
    pub async fn store(&self, path: &Path) -> Result<(), NvramError> {
        let file = NvramFile {
            path_delay: self
                .delays
                .iter()
                .map(|(&(domain_number, port), &delay_ns)| StoredPathDelay {
                    domain_number,
                    port,
                    delay_ns,
                })
                .collect(),
        };
        let contents = serde_json::to_vec_pretty(&file)?;

        let mut temporary = path.as_os_str().to_owned();
        temporary.push(".tmp");
        tokio::fs::write(&temporary, contents).await?;
        tokio::fs::rename(&temporary, path).await?;
        Ok(())
    }

    /// Record the delay of a port. Returns whether anything changed. An
    /// unknown delay removes the entry.
    pub fn record(&mut self, domain_number: u8, port: usize, delay: Option<Duration>) -> bool {
        let key = (domain_number, port);
        match delay {
            Some(delay) => {
                let delay_ns = delay.nanos_saturating();
                self.delays.insert(key, delay_ns) != Some(delay_ns)
            }
            None => self.delays.remove(&key).is_some(),
        }
    }

    /// The delays as seeds for the engine
    pub fn seeds(&self) -> PathDelaySeeds {
        self.delays
            .iter()
            .map(|(&key, &delay_ns)| (key, Duration::from_nanos(delay_ns)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temporary_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("gptp-nvram-{}-{}.json", name, std::process::id()))
    }

    #[test]
    fn missing_file_is_empty() {
        let nvram = Nvram::load(&temporary_path("missing")).unwrap();
        assert!(nvram.seeds().is_empty());
    }

    #[test]
    fn records_changes_only() {
        let mut nvram = Nvram::default();
        assert!(nvram.record(0, 1, Some(Duration::from_nanos(420))));
        assert!(!nvram.record(0, 1, Some(Duration::from_nanos(420))));
        assert!(nvram.record(0, 1, Some(Duration::from_nanos(421))));
        assert!(nvram.record(0, 1, None));
        assert!(!nvram.record(0, 1, None));
    }

    #[tokio::test]
    async fn survives_restart() {
        let path = temporary_path("restart");

        let mut nvram = Nvram::default();
        nvram.record(0, 0, Some(Duration::from_nanos(350)));
        nvram.record(20, 1, Some(Duration::from_nanos(1200)));
        nvram.store(&path).await.unwrap();

        let seeds = Nvram::load(&path).unwrap().seeds();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(seeds.len(), 2);
        assert_eq!(seeds.get(&(0, 0)), Some(&Duration::from_nanos(350)));
        assert_eq!(seeds.get(&(20, 1)), Some(&Duration::from_nanos(1200)));
    }

    #[test]
    fn rejects_garbage() {
        let path = temporary_path("garbage");
        std::fs::write(&path, b"{\"path-delay\": 5}").unwrap();
        let result = Nvram::load(&path);
        std::fs::remove_file(&path).unwrap();

        assert!(matches!(result, Err(NvramError::Json(_))));
    }
}
