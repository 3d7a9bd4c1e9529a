use super::KeyValueBackend;
use anyhow::{Context, Result};
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use std::path::Path;
use tracing::debug;

const PARTITION: &str = "preferences";

/// Preferences stored in a fjall keyspace partition.
pub struct DiskBackend {
    keyspace: Keyspace,
    partition: PartitionHandle,
}

impl DiskBackend {
    pub fn open(path: &Path) -> Result<Self> {
        let keyspace = Config::new(path)
            .open()
            .with_context(|| format!("Failed to open keyspace at {}", path.display()))?;
        let partition = keyspace
            .open_partition(PARTITION, PartitionCreateOptions::default())
            .context("Failed to open preferences partition")?;
        Ok(Self {
            keyspace,
            partition,
        })
    }
}

impl KeyValueBackend for DiskBackend {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .partition
            .get(key.as_bytes())
            .with_context(|| format!("Failed to read key: {key}"))?;
        debug!(key, hit = value.is_some(), "Disk GET");
        value
            .map(|bytes| String::from_utf8(bytes.to_vec()))
            .transpose()
            .with_context(|| format!("Stored value for {key} is not UTF-8"))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.partition
            .insert(key.as_bytes(), value.as_bytes())
            .with_context(|| format!("Failed to write key: {key}"))?;
        self.keyspace
            .persist(PersistMode::SyncAll)
            .context("Failed to persist keyspace")?;
        debug!(key, "Disk SET");
        Ok(())
    }
}
