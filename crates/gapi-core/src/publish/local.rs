use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use gapi_domain::{ArtifactDescriptor, EngineError, Fingerprint};
use gapi_store::fs::{acquire_lock, compute_sha512, lock_file_name, write_atomic, HashingWriter};
use tempfile::NamedTempFile;

use super::{io_error, plumbing, sidecar, ArtifactStore, PublishOptions, StoreAction};

pub(crate) const LOCK_DIR: &str = ".locks";

/// A Maven-layout directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalRepository {
    root: PathBuf,
}

impl LocalRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn write_payload(&self, artifact: &ArtifactDescriptor, dest: &Path) -> Result<(), EngineError> {
        let parent = dest.parent().unwrap_or(&self.root);
        fs::create_dir_all(parent)
            .map_err(io_error(format!("failed to create {}", parent.display())))?;
        let tmp = NamedTempFile::new_in(parent)
            .map_err(io_error(format!("failed to create temp file in {}", parent.display())))?;
        let mut source = File::open(&artifact.payload)
            .map_err(io_error(format!("failed to open {}", artifact.payload.display())))?;
        let mut sink = HashingWriter::new(tmp);
        io::copy(&mut source, &mut sink)
            .map_err(io_error(format!("failed to copy {}", artifact.payload.display())))?;
        let (tmp, actual) = sink
            .finish()
            .map_err(io_error(format!("failed to write {}", dest.display())))?;
        if actual != artifact.fingerprint {
            return Err(EngineError::ChecksumMismatch {
                subject: artifact.coordinates.to_string(),
                expected: artifact.fingerprint.to_string(),
                actual: actual.to_string(),
            });
        }
        tmp.as_file()
            .sync_all()
            .map_err(io_error(format!("failed to flush {}", dest.display())))?;
        tmp.persist(dest).map_err(|err| {
            EngineError::io(format!("failed to move {} into place", dest.display()), err.error)
        })?;
        Ok(())
    }

    fn write_sidecars(
        &self,
        artifact: &ArtifactDescriptor,
        dest: &Path,
        options: PublishOptions,
    ) -> Result<(), EngineError> {
        write_atomic(&sidecar(dest, "sha256"), artifact.fingerprint.as_str().as_bytes())
            .map_err(plumbing("failed to write sha256 sidecar"))?;
        if options.write_sha512 {
            let digest = compute_sha512(dest).map_err(plumbing("failed to hash payload"))?;
            write_atomic(&sidecar(dest, "sha512"), digest.as_bytes())
                .map_err(plumbing("failed to write sha512 sidecar"))?;
        }
        Ok(())
    }
}

impl ArtifactStore for LocalRepository {
    fn store(
        &self,
        artifact: &ArtifactDescriptor,
        options: PublishOptions,
    ) -> Result<StoreAction, EngineError> {
        let coordinates = &artifact.coordinates;
        let lock_path = self
            .root
            .join(LOCK_DIR)
            .join(lock_file_name(&coordinates.to_string()));
        let _lock = acquire_lock(&lock_path).map_err(plumbing("failed to lock repository entry"))?;

        let dest = self.root.join(coordinates.repository_path());
        if dest.exists() {
            let existing = Fingerprint::of_file(&dest)?;
            if existing == artifact.fingerprint {
                // Sidecars may be missing after an interrupted run.
                if !sidecar(&dest, "sha256").exists()
                    || (options.write_sha512 && !sidecar(&dest, "sha512").exists())
                {
                    self.write_sidecars(artifact, &dest, options)?;
                }
                return Ok(StoreAction::SkippedIdentical);
            }
            if !options.overwrite {
                return Err(EngineError::CoordinateCollision {
                    coordinates: coordinates.to_string(),
                    existing: existing.to_string(),
                    incoming: artifact.fingerprint.to_string(),
                });
            }
        }

        self.write_payload(artifact, &dest)?;
        self.write_sidecars(artifact, &dest, options)?;
        Ok(StoreAction::Published)
    }
}
