use std::sync::Arc;

use anyhow::Result;
use gapi_domain::CompatibilityResolver;
use gapi_store::{
    http_client, CacheLocation, DistributionExtractor, DistributionSource, ExtractorSettings,
    HttpDistributionSource, HttpOptions, LayoutRules, LocalDistributionSource,
};

use crate::config::{Config, EnvSnapshot, GlobalOptions};
use crate::credentials::{CredentialChain, EnvCredentials, ExplicitCredentials, ResolvedCredentials};
use crate::effects::{Effects, SharedEffects};

pub struct CommandContext<'a> {
    pub global: &'a GlobalOptions,
    env: EnvSnapshot,
    config: Config,
    resolver: CompatibilityResolver,
    effects: SharedEffects,
}

impl<'a> CommandContext<'a> {
    /// Creates a context from the current process environment.
    ///
    /// # Errors
    /// Returns an error if the configuration cannot be prepared.
    pub fn new(global: &'a GlobalOptions, effects: SharedEffects) -> Result<Self> {
        Self::from_snapshot(global, EnvSnapshot::capture(), effects)
    }

    /// # Errors
    /// Returns an error if the configuration cannot be prepared.
    pub fn from_snapshot(
        global: &'a GlobalOptions,
        env: EnvSnapshot,
        effects: SharedEffects,
    ) -> Result<Self> {
        let config = Config::from_snapshot(&env, effects.cache())?;
        Ok(Self {
            global,
            env,
            config,
            resolver: CompatibilityResolver::default(),
            effects,
        })
    }

    pub fn effects(&self) -> &dyn Effects {
        self.effects.as_ref()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn env(&self) -> &EnvSnapshot {
        &self.env
    }

    pub fn resolver(&self) -> &CompatibilityResolver {
        &self.resolver
    }

    pub fn cache(&self) -> &CacheLocation {
        &self.config.cache().store
    }

    pub fn is_online(&self) -> bool {
        self.config.network().online && !self.global.offline
    }

    pub fn http_options(&self) -> HttpOptions {
        HttpOptions {
            keep_proxies: self.config.network().keep_proxies,
            ..HttpOptions::default()
        }
    }

    /// Explicit credentials first, then the configured environment variables.
    pub fn credentials(
        &self,
        username: Option<String>,
        password: Option<String>,
    ) -> Option<ResolvedCredentials> {
        let publish = self.config.publish();
        CredentialChain::new()
            .with(ExplicitCredentials::new(username, password))
            .with(EnvCredentials::new(
                &self.env,
                publish.username_env,
                publish.password_env,
            ))
            .resolve()
    }

    /// Builds the extractor for the configured distribution source.
    ///
    /// # Errors
    /// Fails when the layout rule file is invalid or the HTTP client cannot
    /// be built.
    pub fn extractor(&self) -> Result<DistributionExtractor> {
        let distribution = self.config.distribution();
        let layout = match &distribution.layout_rules {
            Some(path) => LayoutRules::from_json_file(path)?,
            None => LayoutRules::builtin(),
        };
        let source: Arc<dyn DistributionSource> = match &distribution.local_dir {
            Some(dir) => Arc::new(LocalDistributionSource::new(dir, distribution.flavor)),
            None => Arc::new(
                HttpDistributionSource::new(http_client(self.http_options())?, distribution.flavor)
                    .with_base_url(distribution.base_url.as_str())
                    .with_snapshot_url(distribution.snapshot_url.as_str())
                    .online(self.is_online()),
            ),
        };
        let publish = self.config.publish();
        let settings = ExtractorSettings {
            cache_root: self.cache().path.clone(),
            group: publish.group.clone(),
            license: publish.license.clone(),
            layout,
            verify_published_checksum: distribution.verify_checksum,
        };
        Ok(DistributionExtractor::new(settings, source))
    }
}
