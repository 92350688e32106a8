use std::{
    collections::BTreeMap,
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

use log::{debug, info};

use super::network::NetworkRecord;
use crate::core::error::Result;

pub const CONFIG_FILE: &str = "config.json";

/// Durable home of the network definitions.
#[cfg_attr(test, mockall::automock)]
pub trait NetworkStore: Send + Sync {
    fn save(&self, records: &[NetworkRecord]) -> Result<()>;

    /// An empty store yields no records.
    fn load(&self) -> Result<Vec<NetworkRecord>>;
}

/// One JSON object, keyed by network id, in `<dir>/config.json`.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        JsonFileStore {
            path: dir.as_ref().join(CONFIG_FILE),
        }
    }

    /// Like [`JsonFileStore::new`], creating the directory first.
    pub fn create(dir: impl AsRef<Path>) -> Result<Self> {
        fs::create_dir_all(dir.as_ref())?;
        Ok(Self::new(dir))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl NetworkStore for JsonFileStore {
    fn save(&self, records: &[NetworkRecord]) -> Result<()> {
        let by_id: BTreeMap<&str, &NetworkRecord> =
            records.iter().map(|r| (r.id.as_str(), r)).collect();
        let contents = serde_json::to_vec(&by_id)?;

        // Readers only ever see the old or the new file.
        let tmp_path = self.path.with_extension("json.tmp");
        let mut file = File::create(&tmp_path)?;
        file.write_all(&contents)?;
        file.sync_all()?;
        fs::rename(&tmp_path, &self.path)?;

        debug!("Save config {:?} to [{}]", records, self.path.display());
        Ok(())
    }

    fn load(&self) -> Result<Vec<NetworkRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let contents = fs::read_to_string(&self.path)?;
        let by_id: BTreeMap<String, NetworkRecord> = serde_json::from_str(&contents)?;

        info!("Load config from [{}]", self.path.display());
        Ok(by_id.into_values().collect())
    }
}
