//! Distribution download, extraction cache and jar repackaging.

use std::env;
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use dirs_next::home_dir;
use serde::Serialize;

pub mod dependencies;
mod extract;
pub mod fs;
pub mod layout;
pub mod net;
pub mod repackage;
pub mod source;

#[cfg(test)]
mod test_support;

pub use dependencies::{LibraryDependencies, MavenDependency};
pub use extract::{DistributionExtractor, ExtractedSet, ExtractorSettings};
pub use layout::{EntryPattern, LayoutRule, LayoutRules};
pub use net::{http_client, keep_proxies, HttpOptions};
pub use repackage::License;
pub use source::{
    DistributionFlavor, DistributionSource, HttpDistributionSource, LocalDistributionSource,
    SourceFailure, DEFAULT_DISTRIBUTION_URL, DEFAULT_SNAPSHOT_DISTRIBUTION_URL,
};

pub const CACHE_PATH_ENV: &str = "GAPI_CACHE_PATH";

#[derive(Debug, Clone, Serialize)]
pub struct CacheLocation {
    pub path: PathBuf,
    pub source: &'static str,
}

/// Resolves the cache root: `GAPI_CACHE_PATH`, then `XDG_CACHE_HOME/gapi`,
/// then `~/.cache/gapi`.
pub fn resolve_cache_root() -> Result<CacheLocation> {
    if let Some(override_path) = env::var_os(CACHE_PATH_ENV) {
        let path = absolutize(PathBuf::from(override_path))?;
        return Ok(CacheLocation {
            path,
            source: CACHE_PATH_ENV,
        });
    }

    #[cfg(target_os = "windows")]
    let (base, source) = resolve_windows_cache_base()?;
    #[cfg(not(target_os = "windows"))]
    let (base, source) = resolve_unix_cache_base()?;

    Ok(CacheLocation {
        path: base.join("gapi"),
        source,
    })
}

#[cfg(not(target_os = "windows"))]
fn resolve_unix_cache_base() -> Result<(PathBuf, &'static str)> {
    if let Some(xdg) = env::var_os("XDG_CACHE_HOME") {
        return Ok((PathBuf::from(xdg), "XDG_CACHE_HOME"));
    }
    let home = home_dir().ok_or_else(|| anyhow!("unable to determine home directory"))?;
    Ok((home.join(".cache"), "~/.cache"))
}

#[cfg(target_os = "windows")]
fn resolve_windows_cache_base() -> Result<(PathBuf, &'static str)> {
    if let Some(local) = env::var_os("LOCALAPPDATA") {
        return Ok((PathBuf::from(local), "LOCALAPPDATA"));
    }
    let home = home_dir().ok_or_else(|| anyhow!("unable to determine home directory"))?;
    Ok((home.join("AppData").join("Local"), "home/AppData/Local"))
}

fn absolutize(path: PathBuf) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path)
    } else {
        Ok(env::current_dir()?.join(path))
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;

    use serial_test::serial;

    use super::*;

    struct EnvGuard {
        key: &'static str,
        previous: Option<OsString>,
    }

    impl EnvGuard {
        fn set(key: &'static str, value: impl Into<OsString>) -> Self {
            let previous = env::var_os(key);
            env::set_var(key, value.into());
            Self { key, previous }
        }

        fn unset(key: &'static str) -> Self {
            let previous = env::var_os(key);
            env::remove_var(key);
            Self { key, previous }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match self.previous.take() {
                Some(value) => env::set_var(self.key, value),
                None => env::remove_var(self.key),
            }
        }
    }

    #[test]
    #[serial]
    fn resolves_cache_path_override() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let override_path = temp.path().join("cache-root");
        let _guard = EnvGuard::set(CACHE_PATH_ENV, &override_path);
        let location = resolve_cache_root()?;
        assert_eq!(location.source, CACHE_PATH_ENV);
        assert_eq!(location.path, override_path);
        Ok(())
    }

    #[cfg(not(target_os = "windows"))]
    #[test]
    #[serial]
    fn falls_back_to_xdg_cache_home() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let _cache = EnvGuard::unset(CACHE_PATH_ENV);
        let _xdg = EnvGuard::set("XDG_CACHE_HOME", temp.path());
        let location = resolve_cache_root()?;
        assert_eq!(location.source, "XDG_CACHE_HOME");
        assert_eq!(location.path, temp.path().join("gapi"));
        Ok(())
    }
}
