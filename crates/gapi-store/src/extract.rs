use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError};

use gapi_domain::{
    ArtifactCoordinates, ArtifactDescriptor, ArtifactSelection, EngineError, Fingerprint,
    GradleVersion, LogicalArtifact,
};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use zip::ZipArchive;

use crate::dependencies::infer_dependencies;
use crate::fs::{acquire_lock, lock_file_name, HashingWriter, KeyedLocks, TempWorkspace};
use crate::layout::LayoutRules;
use crate::repackage::{merge_jars, render_pom, source_entry_name, write_sources_jar, License};
use crate::source::{DistributionFlavor, DistributionSource};

const MANIFEST_FILE: &str = "manifest.json";
const WORKSPACE_PREFIX: &str = "extract-";

/// Publishing identity and metadata applied to every extracted artifact.
#[derive(Debug, Clone)]
pub struct ExtractorSettings {
    pub cache_root: PathBuf,
    pub group: String,
    pub license: License,
    pub layout: LayoutRules,
    /// Check freshly downloaded zips against the digest the source publishes.
    pub verify_published_checksum: bool,
}

/// Result of one extraction: the descriptors plus where they live.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractedSet {
    pub version: GradleVersion,
    pub selection: ArtifactSelection,
    pub artifacts: Vec<ArtifactDescriptor>,
    pub cache_hit: bool,
    pub location: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct SetManifest {
    version: GradleVersion,
    selection: ArtifactSelection,
    flavor: DistributionFlavor,
    /// sha256 of the zip the set was built from.
    #[serde(default)]
    distribution_sha256: Option<Fingerprint>,
    artifacts: Vec<ManifestEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ManifestEntry {
    coordinates: ArtifactCoordinates,
    logical: LogicalArtifact,
    fingerprint: Fingerprint,
    size: u64,
    file: String,
}

impl ManifestEntry {
    fn into_descriptor(self, dir: &Path) -> ArtifactDescriptor {
        ArtifactDescriptor {
            payload: dir.join(&self.file),
            coordinates: self.coordinates,
            logical: self.logical,
            fingerprint: self.fingerprint,
            size: self.size,
        }
    }
}

pub struct DistributionExtractor {
    settings: ExtractorSettings,
    source: Arc<dyn DistributionSource>,
    locks: KeyedLocks,
}

impl DistributionExtractor {
    pub fn new(settings: ExtractorSettings, source: Arc<dyn DistributionSource>) -> Self {
        Self {
            settings,
            source,
            locks: KeyedLocks::new(),
        }
    }

    #[must_use]
    pub fn cache_root(&self) -> &Path {
        &self.settings.cache_root
    }

    #[must_use]
    pub fn layout(&self) -> &LayoutRules {
        &self.settings.layout
    }

    fn set_dir(&self, version: &GradleVersion, selection: &ArtifactSelection) -> PathBuf {
        self.settings
            .cache_root
            .join("extracted")
            .join(version.path_segment())
            .join(format!("{}-{}", selection.cache_key(), self.source.flavor()))
    }

    /// Produces the artifacts for `selection` from the `version` distribution,
    /// reusing a previous extraction when its payloads are intact.
    ///
    /// # Errors
    /// [`EngineError::DistributionUnavailable`] when the source cannot supply
    /// the zip, [`EngineError::LayoutMismatch`] when the layout rules do not
    /// fit it and [`EngineError::ChecksumMismatch`] when its digest is wrong,
    /// including when a cached set was built from a zip with another digest.
    /// The cache is left untouched on every error.
    pub fn extract(
        &self,
        version: &GradleVersion,
        selection: &ArtifactSelection,
        expected_sha256: Option<&Fingerprint>,
    ) -> Result<ExtractedSet, EngineError> {
        let dir = self.set_dir(version, selection);
        if let Some(set) = self.load_cached(&dir, version, selection, expected_sha256)? {
            return Ok(set);
        }

        let key = version.path_segment();
        let slot = self.locks.slot(&key);
        let _guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
        let lock_path = self
            .settings
            .cache_root
            .join("locks")
            .join(lock_file_name(&key));
        let _file_lock = acquire_lock(&lock_path).map_err(plumbing("failed to lock extraction"))?;

        // Another extraction may have finished while we waited.
        if let Some(set) = self.load_cached(&dir, version, selection, expected_sha256)? {
            return Ok(set);
        }

        let (zip, digest) = self.ensure_distribution(version, expected_sha256)?;
        self.build_set(version, selection, &zip, digest, &dir)
    }

    /// `Ok(None)` means the set must be (re)built.
    fn load_cached(
        &self,
        dir: &Path,
        version: &GradleVersion,
        selection: &ArtifactSelection,
        expected_sha256: Option<&Fingerprint>,
    ) -> Result<Option<ExtractedSet>, EngineError> {
        let Ok(text) = fs::read_to_string(dir.join(MANIFEST_FILE)) else {
            return Ok(None);
        };
        let manifest: SetManifest = match serde_json::from_str(&text) {
            Ok(manifest) => manifest,
            Err(err) => {
                warn!(
                    dir = %dir.display(),
                    error = %err,
                    "ignoring unreadable extraction manifest"
                );
                return Ok(None);
            }
        };
        if &manifest.version != version || &manifest.selection != selection {
            return Ok(None);
        }
        if let Some(expected) = expected_sha256 {
            match &manifest.distribution_sha256 {
                Some(recorded) if recorded == expected => {}
                Some(recorded) => {
                    return Err(EngineError::ChecksumMismatch {
                        subject: self.source.flavor().file_name(version),
                        expected: expected.to_string(),
                        actual: recorded.to_string(),
                    });
                }
                // Built before digests were recorded; rebuild against the zip.
                None => return Ok(None),
            }
        }
        for entry in &manifest.artifacts {
            let payload = dir.join(&entry.file);
            let intact = fs::metadata(&payload).is_ok_and(|meta| meta.len() == entry.size)
                && Fingerprint::of_file(&payload).is_ok_and(|actual| actual == entry.fingerprint);
            if !intact {
                warn!(
                    payload = %payload.display(),
                    "cached artifact changed on disk; re-extracting"
                );
                return Ok(None);
            }
        }
        debug!(%version, selection = %selection.cache_key(), "extraction cache hit");
        Ok(Some(ExtractedSet {
            version: version.clone(),
            selection: selection.clone(),
            artifacts: manifest
                .artifacts
                .into_iter()
                .map(|entry| entry.into_descriptor(dir))
                .collect(),
            cache_hit: true,
            location: dir.to_path_buf(),
        }))
    }

    /// Returns the path and sha256 of a verified distribution zip in the cache.
    fn ensure_distribution(
        &self,
        version: &GradleVersion,
        expected: Option<&Fingerprint>,
    ) -> Result<(PathBuf, Fingerprint), EngineError> {
        let flavor = self.source.flavor();
        let dir = self.settings.cache_root.join("distributions");
        let dest = dir.join(format!("gradle-{}-{}.zip", version.path_segment(), flavor));

        if dest.exists() {
            match (Fingerprint::of_file(&dest), expected) {
                (Ok(actual), None) => {
                    debug!(zip = %dest.display(), "reusing cached distribution");
                    return Ok((dest, actual));
                }
                (Ok(actual), Some(expected)) if &actual == expected => return Ok((dest, actual)),
                _ => {
                    warn!(
                        zip = %dest.display(),
                        "cached distribution is unreadable or has another digest"
                    );
                    let _ = fs::remove_file(&dest);
                }
            }
        }

        fs::create_dir_all(&dir)
            .map_err(|err| EngineError::io(format!("failed to create {}", dir.display()), err))?;
        let label = self.source.label();
        let tmp = NamedTempFile::new_in(&dir).map_err(|err| {
            EngineError::io(format!("failed to create temp file in {}", dir.display()), err)
        })?;
        let mut sink = HashingWriter::new(tmp);
        let size = self
            .source
            .fetch(version, &mut sink)
            .map_err(|failure| failure.into_engine_error(version, &label))?;
        let (tmp, actual) = sink
            .finish()
            .map_err(|err| EngineError::io(format!("failed to write {}", dest.display()), err))?;

        let expected = match expected {
            Some(expected) => Some(expected.clone()),
            None if self.settings.verify_published_checksum => {
                self.source.published_checksum(version)
            }
            None => None,
        };
        if let Some(expected) = expected {
            if expected != actual {
                return Err(EngineError::ChecksumMismatch {
                    subject: self.source.flavor().file_name(version),
                    expected: expected.to_string(),
                    actual: actual.to_string(),
                });
            }
        }

        tmp.persist(&dest).map_err(|err| {
            EngineError::io(format!("failed to store {}", dest.display()), err.error)
        })?;
        info!(%version, source = %label, bytes = size, "cached Gradle distribution");
        Ok((dest, actual))
    }

    fn build_set(
        &self,
        version: &GradleVersion,
        selection: &ArtifactSelection,
        zip_path: &Path,
        zip_sha256: Fingerprint,
        dest: &Path,
    ) -> Result<ExtractedSet, EngineError> {
        let workspace =
            TempWorkspace::new_in(&self.settings.cache_root.join("tmp"), WORKSPACE_PREFIX)
                .map_err(plumbing("failed to create extraction workspace"))?;
        let mut archive = match File::open(zip_path).map_err(anyhow::Error::from).and_then(|file| {
            ZipArchive::new(file).map_err(anyhow::Error::from)
        }) {
            Ok(archive) => archive,
            Err(err) => {
                let _ = fs::remove_file(zip_path);
                return Err(EngineError::DistributionUnavailable {
                    version: version.to_string(),
                    source_label: self.source.label(),
                    reason: format!("downloaded archive is unreadable: {err}"),
                });
            }
        };

        // Paths relative to the `gradle-<version>/` root directory.
        let mut entries: BTreeMap<String, usize> = BTreeMap::new();
        for index in 0..archive.len() {
            let entry = archive
                .by_index(index)
                .map_err(|err| plumbing("failed to read distribution")(err.into()))?;
            if entry.is_dir() {
                continue;
            }
            if let Some((_, relative)) = entry.name().split_once('/') {
                if !relative.is_empty() {
                    entries.insert(relative.to_string(), index);
                }
            }
        }
        let sources: BTreeMap<String, usize> = if self.source.flavor() == DistributionFlavor::All {
            entries
                .iter()
                .filter_map(|(name, index)| {
                    source_entry_name(name).map(|inner| (inner.to_string(), *index))
                })
                .collect()
        } else {
            BTreeMap::new()
        };

        let inputs_root = workspace.path().join("inputs");
        let mut written: Vec<ManifestEntry> = Vec::new();
        for logical in selection.iter() {
            let matched = self.settings.layout.select(
                logical,
                version,
                entries.keys().map(String::as_str),
            )?;
            if matched.is_empty() {
                return Err(EngineError::LayoutMismatch {
                    version: version.to_string(),
                    artifact: logical.to_string(),
                    detail: "no distribution entries matched".into(),
                });
            }
            debug!(%version, artifact = %logical, jars = matched.len(), "repackaging");

            let input_dir = inputs_root.join(logical.as_str());
            fs::create_dir_all(&input_dir).map_err(|err| {
                EngineError::io(format!("failed to create {}", input_dir.display()), err)
            })?;
            let mut inputs = Vec::with_capacity(matched.len());
            for (position, relative) in matched.iter().enumerate() {
                let file_name = relative.rsplit('/').next().unwrap_or(relative);
                let target = input_dir.join(format!("{position:04}-{file_name}"));
                let index = entries[relative];
                copy_entry(&mut archive, index, &target)
                    .map_err(|err| EngineError::io(format!("failed to unpack {relative}"), err))?;
                inputs.push(target);
            }

            let jar = self.coordinates(logical, version, None, "jar")?;
            let jar_path = workspace.path().join(jar.file_name());
            let report = merge_jars(&inputs, &jar_path, logical.artifact_name(), version.as_str())
                .map_err(plumbing(format!("failed to repackage {logical}")))?;
            written.push(manifest_entry(jar, logical, &jar_path)?);

            if !sources.is_empty() {
                let sources_jar = self.coordinates(logical, version, Some("sources"), "jar")?;
                let sources_path = workspace.path().join(sources_jar.file_name());
                let produced = write_sources_jar(
                    &mut archive,
                    &sources,
                    &report.class_packages,
                    &sources_path,
                    logical.artifact_name(),
                    version.as_str(),
                )
                .map_err(plumbing(format!("failed to package sources for {logical}")))?;
                if produced {
                    written.push(manifest_entry(sources_jar, logical, &sources_path)?);
                }
            }

            let pom = self.coordinates(logical, version, None, "pom")?;
            let dependencies = logical
                .depends_on()
                .iter()
                .filter(|dependency| selection.contains(**dependency))
                .map(|dependency| self.coordinates(*dependency, version, None, "jar"))
                .collect::<Result<Vec<_>, _>>()?;
            let libraries = infer_dependencies(&mut archive, &entries, &matched)
                .map_err(plumbing(format!("failed to read module classpaths for {logical}")))?;
            debug!(
                artifact = %logical,
                libraries = libraries.libraries.len(),
                boms = libraries.boms.len(),
                "inferred library dependencies"
            );
            let description = format!("{} from Gradle {version}", logical.artifact_name());
            let pom_path = workspace.path().join(pom.file_name());
            let pom_bytes = render_pom(
                &pom,
                &description,
                &self.settings.license,
                &dependencies,
                &libraries,
            )
            .map_err(plumbing(format!("failed to render POM for {logical}")))?;
            fs::write(&pom_path, pom_bytes).map_err(|err| {
                EngineError::io(format!("failed to write {}", pom_path.display()), err)
            })?;
            written.push(manifest_entry(pom, logical, &pom_path)?);
        }

        fs::remove_dir_all(&inputs_root).map_err(|err| {
            EngineError::io(format!("failed to clean {}", inputs_root.display()), err)
        })?;

        let manifest = SetManifest {
            version: version.clone(),
            selection: selection.clone(),
            flavor: self.source.flavor(),
            distribution_sha256: Some(zip_sha256),
            artifacts: written,
        };
        let manifest_json = serde_json::to_vec_pretty(&manifest)
            .map_err(|err| plumbing("failed to encode extraction manifest")(err.into()))?;
        fs::write(workspace.path().join(MANIFEST_FILE), manifest_json)
            .map_err(|err| EngineError::io("failed to write extraction manifest", err))?;

        let location = workspace
            .persist(dest)
            .map_err(plumbing("failed to publish extraction"))?;
        info!(
            %version,
            selection = %selection.cache_key(),
            artifacts = manifest.artifacts.len(),
            "extracted Gradle artifacts"
        );
        Ok(ExtractedSet {
            version: version.clone(),
            selection: selection.clone(),
            artifacts: manifest
                .artifacts
                .into_iter()
                .map(|entry| entry.into_descriptor(&location))
                .collect(),
            cache_hit: false,
            location,
        })
    }

    fn coordinates(
        &self,
        logical: LogicalArtifact,
        version: &GradleVersion,
        classifier: Option<&str>,
        extension: &str,
    ) -> Result<ArtifactCoordinates, EngineError> {
        ArtifactCoordinates::new(
            self.settings.group.as_str(),
            logical.artifact_name(),
            version.as_str(),
            classifier.map(ToOwned::to_owned),
            extension,
        )
    }
}

fn manifest_entry(
    coordinates: ArtifactCoordinates,
    logical: LogicalArtifact,
    path: &Path,
) -> Result<ManifestEntry, EngineError> {
    let size = fs::metadata(path)
        .map_err(|err| EngineError::io(format!("failed to stat {}", path.display()), err))?
        .len();
    Ok(ManifestEntry {
        file: coordinates.file_name(),
        fingerprint: Fingerprint::of_file(path)?,
        coordinates,
        logical,
        size,
    })
}

fn copy_entry(archive: &mut ZipArchive<File>, index: usize, target: &Path) -> io::Result<()> {
    let mut entry = archive
        .by_index(index)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
    let mut out = File::create(target)?;
    io::copy(&mut entry, &mut out)?;
    Ok(())
}

fn plumbing(context: impl Into<String>) -> impl FnOnce(anyhow::Error) -> EngineError {
    let context = context.into();
    move |err| EngineError::io(context, io::Error::other(format!("{err:#}")))
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    use gapi_domain::DEFAULT_PUBLISH_GROUP;

    use super::*;
    use crate::source::SourceFailure;
    use crate::test_support::fake_distribution;

    struct CountingSource {
        zip: Option<Vec<u8>>,
        flavor: DistributionFlavor,
        fetches: AtomicUsize,
        delay: Duration,
    }

    impl CountingSource {
        fn serving(version: &str, flavor: DistributionFlavor) -> Self {
            Self {
                zip: Some(fake_distribution(version, flavor == DistributionFlavor::All)),
                flavor,
                fetches: AtomicUsize::new(0),
                delay: Duration::ZERO,
            }
        }

        fn missing() -> Self {
            Self {
                zip: None,
                flavor: DistributionFlavor::Bin,
                fetches: AtomicUsize::new(0),
                delay: Duration::ZERO,
            }
        }

        fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    impl DistributionSource for CountingSource {
        fn label(&self) -> String {
            "counting".into()
        }

        fn flavor(&self) -> DistributionFlavor {
            self.flavor
        }

        fn fetch(
            &self,
            version: &GradleVersion,
            sink: &mut dyn Write,
        ) -> Result<u64, SourceFailure> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            thread::sleep(self.delay);
            let Some(zip) = &self.zip else {
                return Err(SourceFailure::NotFound(format!("gradle-{version}")));
            };
            sink.write_all(zip)
                .map_err(|err| SourceFailure::Unavailable(err.to_string()))?;
            Ok(zip.len() as u64)
        }
    }

    fn extractor(cache: &Path, source: Arc<CountingSource>) -> DistributionExtractor {
        DistributionExtractor::new(
            ExtractorSettings {
                cache_root: cache.to_path_buf(),
                group: DEFAULT_PUBLISH_GROUP.to_string(),
                license: License::default(),
                layout: LayoutRules::builtin(),
                verify_published_checksum: true,
            },
            source,
        )
    }

    fn v(text: &str) -> GradleVersion {
        GradleVersion::parse(text).unwrap()
    }

    fn file_names(set: &ExtractedSet) -> Vec<String> {
        set.artifacts
            .iter()
            .map(|artifact| artifact.coordinates.file_name())
            .collect()
    }

    #[test]
    fn extracts_selected_artifacts_with_poms() {
        let temp = tempfile::tempdir().unwrap();
        let source = Arc::new(CountingSource::serving("8.2", DistributionFlavor::Bin));
        let extractor = extractor(temp.path(), source.clone());
        let selection = ArtifactSelection::parse_list("api,test-kit").unwrap();

        let set = extractor.extract(&v("8.2"), &selection, None).unwrap();
        assert!(!set.cache_hit);
        assert_eq!(
            file_names(&set),
            [
                "gradle-api-8.2.jar",
                "gradle-api-8.2.pom",
                "gradle-test-kit-8.2.jar",
                "gradle-test-kit-8.2.pom",
            ]
        );
        for artifact in &set.artifacts {
            assert!(artifact.payload.starts_with(&set.location));
            artifact.verify_payload().unwrap();
        }
        let test_kit_pom = fs::read_to_string(&set.artifacts[3].payload).unwrap();
        assert!(test_kit_pom.contains("<artifactId>gradle-api</artifactId>"));
        assert!(!temp.path().join("tmp").read_dir().unwrap().any(|_| true));
    }

    #[test]
    fn api_pom_carries_library_dependencies() {
        let temp = tempfile::tempdir().unwrap();
        let source = Arc::new(CountingSource::serving("8.2", DistributionFlavor::Bin));
        let extractor = extractor(temp.path(), source);
        let selection = ArtifactSelection::parse_list("api,wrapper").unwrap();

        let set = extractor.extract(&v("8.2"), &selection, None).unwrap();
        let read_pom = |name: &str| {
            let artifact = set
                .artifacts
                .iter()
                .find(|artifact| artifact.coordinates.file_name() == name)
                .unwrap();
            fs::read_to_string(&artifact.payload).unwrap()
        };

        let api = read_pom("gradle-api-8.2.pom");
        assert!(api.contains("<groupId>org.slf4j</groupId>"));
        assert!(api.contains("<artifactId>slf4j-api</artifactId>"));
        assert!(api.contains("<groupId>com.google.code.gson</groupId>"));
        assert!(api.contains("<artifactId>slf4j-bom</artifactId>"));
        assert!(!api.contains("groovy"));

        let wrapper = read_pom("gradle-wrapper-8.2.pom");
        assert!(!wrapper.contains("slf4j"));
    }

    #[test]
    fn second_extraction_is_served_from_cache() {
        let temp = tempfile::tempdir().unwrap();
        let source = Arc::new(CountingSource::serving("8.2", DistributionFlavor::Bin));
        let extractor = extractor(temp.path(), source.clone());
        let selection = ArtifactSelection::parse_list("api").unwrap();

        let first = extractor.extract(&v("8.2"), &selection, None).unwrap();
        let second = extractor.extract(&v("8.2"), &selection, None).unwrap();
        assert_eq!(source.fetches(), 1);
        assert!(second.cache_hit);
        assert_eq!(first.artifacts, second.artifacts);

        // A different selection re-extracts from the cached zip.
        let wider = ArtifactSelection::parse_list("api,wrapper").unwrap();
        let third = extractor.extract(&v("8.2"), &wider, None).unwrap();
        assert!(!third.cache_hit);
        assert_eq!(source.fetches(), 1);
        assert_eq!(third.artifacts[0].fingerprint, first.artifacts[0].fingerprint);
    }

    #[test]
    fn tampered_cache_is_rebuilt() {
        let temp = tempfile::tempdir().unwrap();
        let source = Arc::new(CountingSource::serving("8.2", DistributionFlavor::Bin));
        let extractor = extractor(temp.path(), source);
        let selection = ArtifactSelection::parse_list("wrapper").unwrap();

        let first = extractor.extract(&v("8.2"), &selection, None).unwrap();
        fs::write(&first.artifacts[0].payload, b"corrupted").unwrap();
        let second = extractor.extract(&v("8.2"), &selection, None).unwrap();
        assert!(!second.cache_hit);
        assert_eq!(first.artifacts[0].fingerprint, second.artifacts[0].fingerprint);
        second.artifacts[0].verify_payload().unwrap();
    }

    #[test]
    fn missing_distribution_leaves_no_trace() {
        let temp = tempfile::tempdir().unwrap();
        let source = Arc::new(CountingSource::missing());
        let extractor = extractor(temp.path(), source);

        let err = extractor
            .extract(&v("1.0"), &ArtifactSelection::all(), None)
            .unwrap_err();
        assert!(matches!(err, EngineError::DistributionUnavailable { .. }));
        assert!(err.is_retryable());
        assert!(!temp.path().join("extracted").exists());
        let leftovers = temp
            .path()
            .join("distributions")
            .read_dir()
            .map(|entries| entries.count())
            .unwrap_or(0);
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn wrong_digest_is_rejected_before_caching() {
        let temp = tempfile::tempdir().unwrap();
        let source = Arc::new(CountingSource::serving("8.2", DistributionFlavor::Bin));
        let extractor = extractor(temp.path(), source);

        let wrong = Fingerprint::of_bytes(b"something else");
        let err = extractor
            .extract(&v("8.2"), &ArtifactSelection::all(), Some(&wrong))
            .unwrap_err();
        assert!(matches!(err, EngineError::ChecksumMismatch { .. }));
        assert!(!temp.path().join("distributions/gradle-8.2-bin.zip").exists());
        assert!(!temp.path().join("extracted").exists());
    }

    #[test]
    fn cached_set_still_honours_declared_digest() {
        let temp = tempfile::tempdir().unwrap();
        let source = Arc::new(CountingSource::serving("8.2", DistributionFlavor::Bin));
        let extractor = extractor(temp.path(), source.clone());
        let selection = ArtifactSelection::parse_list("api").unwrap();

        let first = extractor.extract(&v("8.2"), &selection, None).unwrap();
        let wrong = Fingerprint::of_bytes(b"something else");
        let err = extractor
            .extract(&v("8.2"), &selection, Some(&wrong))
            .unwrap_err();
        assert!(matches!(err, EngineError::ChecksumMismatch { .. }));
        first.artifacts[0].verify_payload().unwrap();

        let zip_digest =
            Fingerprint::of_file(&temp.path().join("distributions/gradle-8.2-bin.zip")).unwrap();
        let again = extractor
            .extract(&v("8.2"), &selection, Some(&zip_digest))
            .unwrap();
        assert!(again.cache_hit);
        assert_eq!(source.fetches(), 1);
    }

    #[test]
    fn layout_mismatch_does_not_publish_partial_set() {
        let temp = tempfile::tempdir().unwrap();
        let source = Arc::new(CountingSource::serving("8.2", DistributionFlavor::Bin));
        let extractor = extractor(temp.path(), source);

        // The fake 8.2 distribution ships no kotlin-dsl jar.
        let selection = ArtifactSelection::parse_list("api,kotlin-dsl").unwrap();
        let err = extractor.extract(&v("8.2"), &selection, None).unwrap_err();
        assert!(matches!(err, EngineError::LayoutMismatch { .. }));
        assert!(!temp.path().join("extracted").exists());
        assert!(!temp.path().join("tmp").read_dir().unwrap().any(|_| true));
    }

    #[test]
    fn all_flavor_adds_sources_classifier() {
        let temp = tempfile::tempdir().unwrap();
        let source = Arc::new(CountingSource::serving("8.2", DistributionFlavor::All));
        let extractor = extractor(temp.path(), source);
        let selection = ArtifactSelection::parse_list("api,local-groovy").unwrap();

        let set = extractor.extract(&v("8.2"), &selection, None).unwrap();
        assert_eq!(
            file_names(&set),
            [
                "gradle-api-8.2.jar",
                "gradle-api-8.2-sources.jar",
                "gradle-api-8.2.pom",
                "local-groovy-8.2.jar",
                "local-groovy-8.2.pom",
            ]
        );
    }

    #[test]
    fn concurrent_requests_for_one_version_fetch_once() {
        let temp = tempfile::tempdir().unwrap();
        let mut source = CountingSource::serving("8.2", DistributionFlavor::Bin);
        source.delay = Duration::from_millis(50);
        let source = Arc::new(source);
        let extractor = Arc::new(extractor(temp.path(), source.clone()));
        let barrier = Arc::new(Barrier::new(4));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let extractor = Arc::clone(&extractor);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    extractor
                        .extract(&v("8.2"), &ArtifactSelection::parse_list("api").unwrap(), None)
                        .unwrap()
                })
            })
            .collect();
        let sets: Vec<ExtractedSet> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(source.fetches(), 1);
        assert_eq!(sets.iter().filter(|set| !set.cache_hit).count(), 1);
        for set in &sets {
            assert_eq!(set.artifacts, sets[0].artifacts);
        }
    }
}
