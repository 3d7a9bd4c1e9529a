pub mod disk;
pub mod memory;

use anyhow::Result;
use disk::DiskBackend;
use memory::MemoryBackend;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

/// A synchronous string key-value medium for preferences.
pub trait KeyValueBackend: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>>;
    fn set_item(&self, key: &str, value: &str) -> Result<()>;
}

/// Opens the on-disk backend under `data_path`, falling back to memory when
/// the keyspace can't be opened.
pub fn open_backend(data_path: &Path) -> Arc<dyn KeyValueBackend> {
    match DiskBackend::open(&data_path.join("preferences")) {
        Ok(backend) => Arc::new(backend),
        Err(e) => {
            warn!(
                error = %e,
                path = %data_path.display(),
                "Failed to open preference store, changes won't persist"
            );
            Arc::new(MemoryBackend::new())
        }
    }
}
