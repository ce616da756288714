use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use anyhow::Result;
use gapi_domain::DEFAULT_PUBLISH_GROUP;
use gapi_store::{
    CacheLocation, DistributionFlavor, License, DEFAULT_DISTRIBUTION_URL,
    DEFAULT_SNAPSHOT_DISTRIBUTION_URL,
};
use serde::{Deserialize, Serialize};

use crate::effects;

pub const USERNAME_ENV: &str = "GAPI_PUBLISH_USERNAME";
pub const PASSWORD_ENV: &str = "GAPI_PUBLISH_PASSWORD";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalOptions {
    pub quiet: bool,
    pub verbose: u8,
    pub trace: bool,
    pub json: bool,
    pub offline: bool,
}

#[derive(Debug, Clone, Default)]
pub struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    #[must_use]
    pub fn capture() -> Self {
        Self {
            vars: env::vars().collect(),
        }
    }

    #[must_use]
    pub fn var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Value of `key` if it is set to something other than whitespace.
    #[must_use]
    pub fn non_blank(&self, key: &str) -> Option<&str> {
        self.var(key).filter(|value| !value.trim().is_empty())
    }

    /// Treats unset as `default`; `0/false/no/off/""` as false.
    #[must_use]
    pub fn flag(&self, key: &str, default: bool) -> bool {
        match self.var(key) {
            Some(value) => {
                let lowered = value.trim().to_ascii_lowercase();
                !matches!(lowered.as_str(), "0" | "false" | "no" | "off" | "")
            }
            None => default,
        }
    }

    pub fn lookup(&self) -> impl Fn(&str) -> Option<String> + '_ {
        move |key| self.var(key).map(ToOwned::to_owned)
    }

    #[must_use]
    pub fn testing(pairs: &[(&str, &str)]) -> Self {
        let vars = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Self { vars }
    }
}

#[derive(Debug)]
pub struct Config {
    pub(crate) cache: CacheConfig,
    pub(crate) network: NetworkConfig,
    pub(crate) distribution: DistributionConfig,
    pub(crate) publish: PublishConfig,
    pub(crate) default_version: Option<String>,
}

impl Config {
    /// Builds a configuration snapshot from the current process environment.
    ///
    /// # Errors
    /// Returns an error if the cache path cannot be resolved or a `GAPI_*`
    /// variable holds an invalid value.
    pub fn from_env(effects: &dyn effects::Effects) -> Result<Self> {
        let snapshot = EnvSnapshot::capture();
        Self::from_snapshot(&snapshot, effects.cache())
    }

    pub fn from_snapshot(
        snapshot: &EnvSnapshot,
        cache_store: &dyn effects::CacheStore,
    ) -> Result<Self> {
        let flavor = match snapshot.non_blank("GAPI_DISTRIBUTION_TYPE") {
            Some(value) => value.parse::<DistributionFlavor>()?,
            None => DistributionFlavor::default(),
        };
        let license = License {
            name: snapshot
                .non_blank("GAPI_LICENSE_NAME")
                .map_or_else(|| License::default().name, ToOwned::to_owned),
            url: snapshot
                .non_blank("GAPI_LICENSE_URL")
                .map_or_else(|| License::default().url, ToOwned::to_owned),
        };
        Ok(Self {
            cache: CacheConfig {
                store: cache_store.resolve_store_path()?,
            },
            network: NetworkConfig {
                online: snapshot.flag("GAPI_ONLINE", true),
                keep_proxies: gapi_store::keep_proxies(snapshot.lookup()),
            },
            distribution: DistributionConfig {
                base_url: snapshot
                    .non_blank("GAPI_DISTRIBUTION_URL")
                    .unwrap_or(DEFAULT_DISTRIBUTION_URL)
                    .to_string(),
                snapshot_url: snapshot
                    .non_blank("GAPI_SNAPSHOT_DISTRIBUTION_URL")
                    .unwrap_or(DEFAULT_SNAPSHOT_DISTRIBUTION_URL)
                    .to_string(),
                local_dir: snapshot.non_blank("GAPI_DISTRIBUTION_DIR").map(PathBuf::from),
                flavor,
                verify_checksum: snapshot.flag("GAPI_VERIFY_DISTRIBUTION_CHECKSUM", true),
                layout_rules: snapshot.non_blank("GAPI_LAYOUT_RULES").map(PathBuf::from),
            },
            publish: PublishConfig {
                group: snapshot
                    .non_blank("GAPI_PUBLISH_GROUP")
                    .unwrap_or(DEFAULT_PUBLISH_GROUP)
                    .to_string(),
                username_env: USERNAME_ENV,
                password_env: PASSWORD_ENV,
                hashes: snapshot.flag("GAPI_PUBLISH_HASHES", false),
                license,
            },
            default_version: snapshot
                .non_blank("GAPI_GRADLE_VERSION")
                .map(|value| value.trim().to_string()),
        })
    }

    #[must_use]
    pub fn cache(&self) -> &CacheConfig {
        &self.cache
    }

    #[must_use]
    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }

    #[must_use]
    pub fn distribution(&self) -> &DistributionConfig {
        &self.distribution
    }

    #[must_use]
    pub fn publish(&self) -> &PublishConfig {
        &self.publish
    }

    #[must_use]
    pub fn default_version(&self) -> Option<&str> {
        self.default_version.as_deref()
    }
}

#[derive(Debug)]
pub struct CacheConfig {
    pub store: CacheLocation,
}

#[derive(Debug, Clone, Copy)]
pub struct NetworkConfig {
    pub online: bool,
    pub keep_proxies: bool,
}

#[derive(Debug, Clone)]
pub struct DistributionConfig {
    pub base_url: String,
    pub snapshot_url: String,
    /// Directory of pre-downloaded zips; replaces the HTTP source when set.
    pub local_dir: Option<PathBuf>,
    pub flavor: DistributionFlavor,
    pub verify_checksum: bool,
    pub layout_rules: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct PublishConfig {
    pub group: String,
    pub username_env: &'static str,
    pub password_env: &'static str,
    pub hashes: bool,
    pub license: License,
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    struct DummyCacheStore;

    impl effects::CacheStore for DummyCacheStore {
        fn resolve_store_path(&self) -> Result<CacheLocation> {
            Ok(CacheLocation {
                path: PathBuf::from("/tmp/gapi-cache"),
                source: "test",
            })
        }
    }

    #[test]
    fn defaults_without_environment() {
        let config = Config::from_snapshot(&EnvSnapshot::testing(&[]), &DummyCacheStore).unwrap();
        assert!(config.network().online);
        assert!(!config.network().keep_proxies);
        assert_eq!(config.distribution().flavor, DistributionFlavor::All);
        assert_eq!(config.distribution().base_url, DEFAULT_DISTRIBUTION_URL);
        assert!(config.distribution().verify_checksum);
        assert_eq!(config.publish().group, "name.remal.gradle-api");
        assert!(!config.publish().hashes);
        assert_eq!(config.publish().license.name, "MIT License");
        assert_eq!(config.cache().store.path, Path::new("/tmp/gapi-cache"));
        assert!(config.default_version().is_none());
    }

    #[test]
    fn reads_gapi_variables() {
        let snapshot = EnvSnapshot::testing(&[
            ("GAPI_ONLINE", "0"),
            ("GAPI_DISTRIBUTION_TYPE", "bin"),
            ("GAPI_DISTRIBUTION_DIR", "/srv/gradle"),
            ("GAPI_PUBLISH_GROUP", "org.example.gradle"),
            ("GAPI_PUBLISH_HASHES", "true"),
            ("GAPI_GRADLE_VERSION", " 8.2 "),
            ("GAPI_LICENSE_NAME", "Apache-2.0"),
        ]);
        let config = Config::from_snapshot(&snapshot, &DummyCacheStore).unwrap();
        assert!(!config.network().online);
        assert_eq!(config.distribution().flavor, DistributionFlavor::Bin);
        assert_eq!(
            config.distribution().local_dir.as_deref(),
            Some(Path::new("/srv/gradle"))
        );
        assert_eq!(config.publish().group, "org.example.gradle");
        assert!(config.publish().hashes);
        assert_eq!(config.default_version(), Some("8.2"));
        assert_eq!(config.publish().license.name, "Apache-2.0");
        assert_eq!(config.publish().license.url, License::default().url);
    }

    #[test]
    fn rejects_unknown_distribution_type() {
        let snapshot = EnvSnapshot::testing(&[("GAPI_DISTRIBUTION_TYPE", "src")]);
        let err = Config::from_snapshot(&snapshot, &DummyCacheStore).unwrap_err();
        assert!(err.to_string().contains("GA101"), "{err}");
    }
}
