use std::sync::Arc;

use anyhow::Result;
use gapi_store::CacheLocation;

use crate::planner::{JvmProvisioner, SystemJvmProvisioner};

/// Side-effecting collaborators the commands reach through, so tests can
/// swap them out.
pub trait Effects: Send + Sync {
    fn cache(&self) -> &dyn CacheStore;
    fn jvms(&self) -> &dyn JvmProvisioner;
}

pub type SharedEffects = Arc<dyn Effects>;

pub trait CacheStore: Send + Sync {
    fn resolve_store_path(&self) -> Result<CacheLocation>;
}

pub struct SystemCacheStore;

impl CacheStore for SystemCacheStore {
    fn resolve_store_path(&self) -> Result<CacheLocation> {
        gapi_store::resolve_cache_root()
    }
}

pub struct SystemEffects {
    cache: Arc<SystemCacheStore>,
    jvms: Arc<SystemJvmProvisioner>,
}

impl SystemEffects {
    #[must_use]
    pub fn new() -> Self {
        Self {
            cache: Arc::new(SystemCacheStore),
            jvms: Arc::new(SystemJvmProvisioner::from_process_env()),
        }
    }
}

impl Default for SystemEffects {
    fn default() -> Self {
        Self::new()
    }
}

impl Effects for SystemEffects {
    fn cache(&self) -> &dyn CacheStore {
        self.cache.as_ref()
    }

    fn jvms(&self) -> &dyn JvmProvisioner {
        self.jvms.as_ref()
    }
}
