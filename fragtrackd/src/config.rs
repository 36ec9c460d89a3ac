use std::path::Path;

use serde::{Deserialize, Serialize};

use fragtrack_core::{Result, store::DEFAULT_CAPACITY};

pub const DEFAULT_LISTEN: &str = "127.0.0.1:7770";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Address the line-protocol listener binds to.
    pub listen: String,
    /// Transfer endpoint advertised to peers; defaults to `listen`.
    pub advertised_endpoint: Option<String>,
    /// Total bytes the in-memory fragment store may hold.
    pub store_capacity: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN.to_string(),
            advertised_endpoint: None,
            store_capacity: DEFAULT_CAPACITY,
        }
    }
}

impl DaemonConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(|e| {
            fragtrack_core::TrackError::InvalidArgument(format!(
                "bad config {}: {e}",
                path.display()
            ))
        })
    }

    pub fn advertised(&self) -> &str {
        self.advertised_endpoint.as_deref().unwrap_or(&self.listen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_fill_missing_keys() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, r#"{{"listen": "0.0.0.0:9000"}}"#).unwrap();
        let cfg = DaemonConfig::load(f.path()).unwrap();
        assert_eq!(cfg.listen, "0.0.0.0:9000");
        assert_eq!(cfg.store_capacity, DEFAULT_CAPACITY);
        assert_eq!(cfg.advertised(), "0.0.0.0:9000");
    }

    #[test]
    fn malformed_config_is_rejected() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "not json").unwrap();
        assert!(DaemonConfig::load(f.path()).is_err());
    }
}
