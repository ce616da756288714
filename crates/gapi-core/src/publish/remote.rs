use std::fs;

use anyhow::Result;
use gapi_domain::{ArtifactDescriptor, EngineError, Fingerprint};
use gapi_store::{http_client, HttpOptions};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use sha2::{Digest, Sha512};
use tracing::debug;
use url::Url;

use super::{io_error, ArtifactStore, PublishOptions, StoreAction};
use crate::credentials::Credentials;

/// Minimal HTTP surface of a Maven repository.
pub trait RepositoryTransport: Send + Sync {
    fn label(&self) -> String;

    /// # Errors
    /// Authentication and availability failures.
    fn exists(&self, path: &str, credentials: Option<&Credentials>) -> Result<bool, EngineError>;

    /// `None` when the path is absent.
    ///
    /// # Errors
    /// Authentication and availability failures.
    fn fetch(
        &self,
        path: &str,
        credentials: Option<&Credentials>,
    ) -> Result<Option<Vec<u8>>, EngineError>;

    /// # Errors
    /// Authentication and availability failures.
    fn put(&self, path: &str, body: Vec<u8>, credentials: &Credentials) -> Result<(), EngineError>;
}

pub struct HttpTransport {
    base: Url,
    client: Client,
}

impl HttpTransport {
    pub fn new(mut base: Url, options: HttpOptions) -> Result<Self> {
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            base,
            client: http_client(options)?,
        })
    }

    fn url_for(&self, path: &str) -> Result<Url, EngineError> {
        self.base.join(path).map_err(|err| {
            EngineError::invalid_config(format!(
                "cannot address '{path}' under {}: {err}",
                self.base
            ))
        })
    }

    fn send(
        &self,
        request: RequestBuilder,
        credentials: Option<&Credentials>,
    ) -> Result<Response, EngineError> {
        let request = match credentials {
            Some(creds) => request.basic_auth(&creds.username, Some(&creds.password)),
            None => request,
        };
        request.send().map_err(|err| EngineError::RepositoryUnavailable {
            target: self.label(),
            reason: err.to_string(),
        })
    }

    fn status_error(&self, path: &str, status: StatusCode) -> EngineError {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                EngineError::AuthenticationRequired {
                    target: self.label(),
                    reason: format!("{status} for {path}"),
                }
            }
            _ => EngineError::RepositoryUnavailable {
                target: self.label(),
                reason: format!("{status} for {path}"),
            },
        }
    }
}

impl RepositoryTransport for HttpTransport {
    fn label(&self) -> String {
        self.base.to_string()
    }

    fn exists(&self, path: &str, credentials: Option<&Credentials>) -> Result<bool, EngineError> {
        let url = self.url_for(path)?;
        let response = self.send(self.client.head(url), credentials)?;
        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(self.status_error(path, status)),
        }
    }

    fn fetch(
        &self,
        path: &str,
        credentials: Option<&Credentials>,
    ) -> Result<Option<Vec<u8>>, EngineError> {
        let url = self.url_for(path)?;
        let response = self.send(self.client.get(url), credentials)?;
        match response.status() {
            status if status.is_success() => {
                let bytes = response.bytes().map_err(|err| EngineError::RepositoryUnavailable {
                    target: self.label(),
                    reason: format!("failed to read {path}: {err}"),
                })?;
                Ok(Some(bytes.to_vec()))
            }
            StatusCode::NOT_FOUND => Ok(None),
            status => Err(self.status_error(path, status)),
        }
    }

    fn put(&self, path: &str, body: Vec<u8>, credentials: &Credentials) -> Result<(), EngineError> {
        let url = self.url_for(path)?;
        let response = self.send(self.client.put(url).body(body), Some(credentials))?;
        let status = response.status();
        if status.is_success() {
            debug!(path, %status, "uploaded");
            Ok(())
        } else {
            Err(self.status_error(path, status))
        }
    }
}

/// Remote repository reached through a [`RepositoryTransport`].
pub struct RemoteRepository<'a> {
    transport: &'a dyn RepositoryTransport,
    credentials: Option<&'a Credentials>,
}

impl<'a> RemoteRepository<'a> {
    pub fn new(
        transport: &'a dyn RepositoryTransport,
        credentials: Option<&'a Credentials>,
    ) -> Self {
        Self {
            transport,
            credentials,
        }
    }

    fn remote_fingerprint(&self, path: &str) -> Result<Option<Fingerprint>, EngineError> {
        let sidecar = format!("{path}.sha256");
        if let Some(bytes) = self.transport.fetch(&sidecar, self.credentials)? {
            if let Ok(fingerprint) = Fingerprint::parse(&String::from_utf8_lossy(&bytes)) {
                return Ok(Some(fingerprint));
            }
        }
        Ok(self
            .transport
            .fetch(path, self.credentials)?
            .map(|payload| Fingerprint::of_bytes(&payload)))
    }
}

impl ArtifactStore for RemoteRepository<'_> {
    fn store(
        &self,
        artifact: &ArtifactDescriptor,
        options: PublishOptions,
    ) -> Result<StoreAction, EngineError> {
        let path = artifact.coordinates.repository_path();
        if self.transport.exists(&path, self.credentials)? {
            if let Some(existing) = self.remote_fingerprint(&path)? {
                if existing == artifact.fingerprint {
                    return Ok(StoreAction::SkippedIdentical);
                }
                if !options.overwrite {
                    return Err(EngineError::CoordinateCollision {
                        coordinates: artifact.coordinates.to_string(),
                        existing: existing.to_string(),
                        incoming: artifact.fingerprint.to_string(),
                    });
                }
            }
        }

        let credentials = self.credentials.ok_or_else(|| EngineError::AuthenticationRequired {
            target: self.transport.label(),
            reason: "no credentials configured for upload".into(),
        })?;

        let payload = fs::read(&artifact.payload)
            .map_err(io_error(format!("failed to read {}", artifact.payload.display())))?;
        let actual = Fingerprint::of_bytes(&payload);
        if actual != artifact.fingerprint {
            return Err(EngineError::ChecksumMismatch {
                subject: artifact.coordinates.to_string(),
                expected: artifact.fingerprint.to_string(),
                actual: actual.to_string(),
            });
        }
        let sha512 = options
            .write_sha512
            .then(|| hex::encode(Sha512::digest(&payload)));

        self.transport.put(&path, payload, credentials)?;
        self.transport.put(
            &format!("{path}.sha256"),
            actual.as_str().as_bytes().to_vec(),
            credentials,
        )?;
        if let Some(digest) = sha512 {
            self.transport
                .put(&format!("{path}.sha512"), digest.into_bytes(), credentials)?;
        }
        Ok(StoreAction::Published)
    }
}
