//! Deterministic jar merging and POM rendering.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{self, Read, Seek, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use gapi_domain::ArtifactCoordinates;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use serde::{Deserialize, Serialize};
use zip::write::FileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

use crate::dependencies::LibraryDependencies;

const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";
const SIGNATURE_SUFFIXES: &[&str] = &[".SF", ".RSA", ".DSA", ".EC"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct License {
    pub name: String,
    pub url: String,
}

impl Default for License {
    fn default() -> Self {
        Self {
            name: "MIT License".to_string(),
            url: "https://choosealicense.com/licenses/mit/".to_string(),
        }
    }
}

#[derive(Debug, Default)]
pub struct MergeReport {
    pub entries: usize,
    pub duplicates: usize,
    /// Directories holding at least one `.class` file, e.g. `org/gradle/api`.
    pub class_packages: BTreeSet<String>,
}

fn entry_options() -> FileOptions {
    FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(0o644)
}

fn is_dropped(name: &str) -> bool {
    if name.eq_ignore_ascii_case(MANIFEST_PATH) {
        return true;
    }
    let Some(file) = name.strip_prefix("META-INF/") else {
        return false;
    };
    !file.contains('/')
        && SIGNATURE_SUFFIXES
            .iter()
            .any(|suffix| file.to_ascii_uppercase().ends_with(suffix))
}

fn manifest_text(title: &str, version: &str) -> String {
    format!(
        "Manifest-Version: 1.0\r\nImplementation-Title: {title}\r\nImplementation-Version: {version}\r\n\r\n"
    )
}

/// Merges `inputs` into a single jar at `output`.
///
/// Inputs are read in the given order and the first occurrence of an entry
/// name wins; the output lists entries sorted by name with fixed timestamps
/// and a generated manifest, so equal inputs always produce equal bytes.
pub fn merge_jars(
    inputs: &[PathBuf],
    output: &Path,
    title: &str,
    version: &str,
) -> Result<MergeReport> {
    let mut archives = Vec::with_capacity(inputs.len());
    for input in inputs {
        let file =
            File::open(input).with_context(|| format!("failed to open {}", input.display()))?;
        let archive = ZipArchive::new(file)
            .with_context(|| format!("{} is not a valid jar", input.display()))?;
        archives.push(archive);
    }

    let mut report = MergeReport::default();
    let mut chosen: BTreeMap<String, (usize, usize)> = BTreeMap::new();
    for (archive_index, archive) in archives.iter_mut().enumerate() {
        for entry_index in 0..archive.len() {
            let entry = archive.by_index(entry_index)?;
            if entry.is_dir() || is_dropped(entry.name()) {
                continue;
            }
            let name = entry.name().to_string();
            if chosen.contains_key(&name) {
                report.duplicates += 1;
                continue;
            }
            if let Some((package, _)) = name.rsplit_once('/') {
                if name.ends_with(".class") {
                    report.class_packages.insert(package.to_string());
                }
            }
            chosen.insert(name, (archive_index, entry_index));
        }
    }

    let file =
        File::create(output).with_context(|| format!("failed to create {}", output.display()))?;
    let mut writer = ZipWriter::new(file);
    writer.start_file(MANIFEST_PATH, entry_options())?;
    writer.write_all(manifest_text(title, version).as_bytes())?;
    for (name, (archive_index, entry_index)) in &chosen {
        let mut entry = archives[*archive_index].by_index(*entry_index)?;
        writer.start_file(name.as_str(), entry_options())?;
        io::copy(&mut entry, &mut writer)
            .with_context(|| format!("failed to copy {name} into {}", output.display()))?;
    }
    writer
        .finish()?
        .sync_all()
        .with_context(|| format!("failed to flush {}", output.display()))?;

    report.entries = chosen.len() + 1;
    Ok(report)
}

/// Builds a sources jar from distribution entries (`jar entry name` → index in
/// `archive`) whose package matches one of `packages`. Returns `false` and
/// writes nothing when nothing matched.
pub fn write_sources_jar<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    sources: &BTreeMap<String, usize>,
    packages: &BTreeSet<String>,
    output: &Path,
    title: &str,
    version: &str,
) -> Result<bool> {
    let selected: Vec<(&String, usize)> = sources
        .iter()
        .filter(|(name, _)| {
            name.rsplit_once('/')
                .is_some_and(|(package, _)| packages.contains(package))
        })
        .map(|(name, index)| (name, *index))
        .collect();
    if selected.is_empty() {
        return Ok(false);
    }

    let file =
        File::create(output).with_context(|| format!("failed to create {}", output.display()))?;
    let mut writer = ZipWriter::new(file);
    writer.start_file(MANIFEST_PATH, entry_options())?;
    writer.write_all(manifest_text(title, version).as_bytes())?;
    for (name, index) in selected {
        writer.start_file(name.as_str(), entry_options())?;
        let mut entry = archive.by_index(index)?;
        io::copy(&mut entry, &mut writer)
            .with_context(|| format!("failed to copy {name} into {}", output.display()))?;
    }
    writer.finish()?.sync_all()?;
    Ok(true)
}

/// Maps a distribution `src/<module>/<package path>/<File>.java` entry to its
/// path inside a sources jar.
#[must_use]
pub fn source_entry_name(distribution_entry: &str) -> Option<&str> {
    let rest = distribution_entry.strip_prefix("src/")?;
    let (_, inner) = rest.split_once('/')?;
    let is_source = [".java", ".groovy", ".kt"]
        .iter()
        .any(|ext| inner.ends_with(ext));
    (is_source && inner.contains('/')).then_some(inner)
}

const POM_NAMESPACE: &str = "http://maven.apache.org/POM/4.0.0";
const POM_SCHEMA_LOCATION: &str =
    "http://maven.apache.org/POM/4.0.0 https://maven.apache.org/xsd/maven-4.0.0.xsd";

/// Renders the POM of one republished artifact. `siblings` are other
/// republished artifacts it depends on; `libraries` are the third-party jars
/// and BOMs found behind its Gradle modules.
pub fn render_pom(
    coordinates: &ArtifactCoordinates,
    description: &str,
    license: &License,
    siblings: &[ArtifactCoordinates],
    libraries: &LibraryDependencies,
) -> Result<Vec<u8>> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.write_event(Event::Start(BytesStart::new("project").with_attributes([
        ("xmlns", POM_NAMESPACE),
        ("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance"),
        ("xsi:schemaLocation", POM_SCHEMA_LOCATION),
    ])))?;
    text_element(&mut writer, "modelVersion", "4.0.0")?;
    text_element(&mut writer, "groupId", &coordinates.group)?;
    text_element(&mut writer, "artifactId", &coordinates.name)?;
    text_element(&mut writer, "version", &coordinates.version)?;
    text_element(&mut writer, "packaging", "jar")?;
    text_element(&mut writer, "description", description)?;

    start(&mut writer, "licenses")?;
    start(&mut writer, "license")?;
    text_element(&mut writer, "name", &license.name)?;
    text_element(&mut writer, "url", &license.url)?;
    end(&mut writer, "license")?;
    end(&mut writer, "licenses")?;

    if !libraries.boms.is_empty() {
        start(&mut writer, "dependencyManagement")?;
        start(&mut writer, "dependencies")?;
        for bom in &libraries.boms {
            dependency(
                &mut writer,
                [&bom.group, &bom.name, &bom.version],
                &[("type", "pom"), ("scope", "import")],
            )?;
        }
        end(&mut writer, "dependencies")?;
        end(&mut writer, "dependencyManagement")?;
    }

    if !siblings.is_empty() || !libraries.libraries.is_empty() {
        start(&mut writer, "dependencies")?;
        for sibling in siblings {
            dependency(
                &mut writer,
                [&sibling.group, &sibling.name, &sibling.version],
                &[("scope", "compile")],
            )?;
        }
        for library in &libraries.libraries {
            dependency(
                &mut writer,
                [&library.group, &library.name, &library.version],
                &[("scope", "compile")],
            )?;
        }
        end(&mut writer, "dependencies")?;
    }

    end(&mut writer, "project")?;
    let mut pom = writer.into_inner();
    pom.push(b'\n');
    Ok(pom)
}

fn start<W: Write>(writer: &mut Writer<W>, name: &str) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    Ok(())
}

fn end<W: Write>(writer: &mut Writer<W>, name: &str) -> Result<()> {
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn text_element<W: Write>(writer: &mut Writer<W>, name: &str, text: &str) -> Result<()> {
    start(writer, name)?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    end(writer, name)
}

fn dependency<W: Write>(
    writer: &mut Writer<W>,
    [group, name, version]: [&str; 3],
    extra: &[(&str, &str)],
) -> Result<()> {
    start(writer, "dependency")?;
    text_element(writer, "groupId", group)?;
    text_element(writer, "artifactId", name)?;
    text_element(writer, "version", version)?;
    for (element, value) in extra {
        text_element(writer, element, value)?;
    }
    end(writer, "dependency")
}

#[cfg(test)]
mod tests {
    use gapi_domain::{Fingerprint, DEFAULT_PUBLISH_GROUP};

    use super::*;
    use crate::dependencies::MavenDependency;

    fn write_jar(path: &Path, entries: &[(&str, &str)]) {
        let mut writer = ZipWriter::new(File::create(path).unwrap());
        for (name, body) in entries {
            writer.start_file(*name, FileOptions::default()).unwrap();
            writer.write_all(body.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }

    fn names(path: &Path) -> Vec<String> {
        let mut archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
        (0..archive.len())
            .map(|index| archive.by_index(index).unwrap().name().to_string())
            .collect()
    }

    #[test]
    fn merge_is_sorted_first_wins_and_unsigned() {
        let temp = tempfile::tempdir().unwrap();
        let first = temp.path().join("a.jar");
        let second = temp.path().join("b.jar");
        write_jar(
            &first,
            &[
                ("org/gradle/api/Project.class", "first"),
                ("META-INF/MANIFEST.MF", "Manifest-Version: 1.0\r\n"),
                ("META-INF/GRADLE.SF", "sig"),
            ],
        );
        write_jar(
            &second,
            &[
                ("org/gradle/api/Project.class", "second"),
                ("org/gradle/api/Action.class", "action"),
                ("META-INF/services/x.Y", "svc"),
            ],
        );

        let output = temp.path().join("merged.jar");
        let report = merge_jars(&[first, second], &output, "gradle-api", "8.2").unwrap();
        assert_eq!(report.duplicates, 1);
        assert!(report.class_packages.contains("org/gradle/api"));
        assert_eq!(
            names(&output),
            [
                "META-INF/MANIFEST.MF",
                "META-INF/services/x.Y",
                "org/gradle/api/Action.class",
                "org/gradle/api/Project.class",
            ]
        );

        let mut archive = ZipArchive::new(File::open(&output).unwrap()).unwrap();
        let mut body = String::new();
        archive
            .by_name("org/gradle/api/Project.class")
            .unwrap()
            .read_to_string(&mut body)
            .unwrap();
        assert_eq!(body, "first");
    }

    #[test]
    fn merge_output_is_byte_stable() {
        let temp = tempfile::tempdir().unwrap();
        let input = temp.path().join("in.jar");
        write_jar(&input, &[("b/B.class", "b"), ("a/A.class", "a")]);
        let one = temp.path().join("one.jar");
        let two = temp.path().join("two.jar");
        merge_jars(&[input.clone()], &one, "t", "1.0").unwrap();
        merge_jars(&[input], &two, "t", "1.0").unwrap();
        assert_eq!(
            Fingerprint::of_file(&one).unwrap(),
            Fingerprint::of_file(&two).unwrap()
        );
    }

    #[test]
    fn sources_follow_class_packages() {
        assert_eq!(
            source_entry_name("src/core-api/org/gradle/api/Project.java"),
            Some("org/gradle/api/Project.java")
        );
        assert_eq!(source_entry_name("src/core-api/README"), None);
        assert_eq!(source_entry_name("lib/x.jar"), None);

        let temp = tempfile::tempdir().unwrap();
        let distribution = temp.path().join("gradle-8.2-all.zip");
        write_jar(
            &distribution,
            &[
                ("gradle-8.2/src/core-api/org/gradle/api/Project.java", "interface Project {}"),
                ("gradle-8.2/src/core/org/gradle/internal/Hidden.java", "class Hidden {}"),
            ],
        );
        let mut archive = ZipArchive::new(File::open(&distribution).unwrap()).unwrap();
        let mut sources = BTreeMap::new();
        for index in 0..archive.len() {
            let name = archive.by_index(index).unwrap().name().to_string();
            let relative = name.split_once('/').unwrap().1;
            if let Some(entry) = source_entry_name(relative) {
                sources.insert(entry.to_string(), index);
            }
        }
        assert_eq!(sources.len(), 2);

        let packages: BTreeSet<String> = ["org/gradle/api".to_string()].into();
        let output = temp.path().join("sources.jar");
        assert!(
            write_sources_jar(&mut archive, &sources, &packages, &output, "gradle-api", "8.2")
                .unwrap()
        );
        assert_eq!(names(&output), ["META-INF/MANIFEST.MF", "org/gradle/api/Project.java"]);

        let none = temp.path().join("none.jar");
        assert!(
            !write_sources_jar(&mut archive, &sources, &BTreeSet::new(), &none, "x", "1").unwrap()
        );
        assert!(!none.exists());
    }

    #[test]
    fn pom_lists_license_and_siblings() {
        let coordinates =
            ArtifactCoordinates::new(DEFAULT_PUBLISH_GROUP, "gradle-test-kit", "8.2", None, "pom")
                .unwrap();
        let api = ArtifactCoordinates::new(DEFAULT_PUBLISH_GROUP, "gradle-api", "8.2", None, "jar")
            .unwrap();
        let pom = render_pom(
            &coordinates,
            "Gradle TestKit 8.2",
            &License::default(),
            &[api],
            &LibraryDependencies::default(),
        )
        .unwrap();
        let pom = String::from_utf8(pom).unwrap();
        assert!(pom.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(pom.contains("<artifactId>gradle-test-kit</artifactId>"));
        assert!(pom.contains("<name>MIT License</name>"));
        assert!(pom.contains("<artifactId>gradle-api</artifactId>"));
        assert!(pom.contains("<groupId>name.remal.gradle-api</groupId>"));
        assert!(!pom.contains("dependencyManagement"));
    }

    #[test]
    fn pom_escapes_text_and_imports_boms() {
        let coordinates =
            ArtifactCoordinates::new(DEFAULT_PUBLISH_GROUP, "gradle-api", "8.2", None, "pom")
                .unwrap();
        let license = License {
            name: "Apache <2.0> & friends".into(),
            url: "https://example.com/?a=1&b=2".into(),
        };
        let asm = MavenDependency {
            group: "org.ow2.asm".into(),
            name: "asm".into(),
            version: "9.5".into(),
        };
        let libraries = LibraryDependencies {
            boms: vec![MavenDependency {
                name: "asm-bom".into(),
                ..asm.clone()
            }],
            libraries: vec![asm],
        };
        let pom = render_pom(&coordinates, "api", &license, &[], &libraries).unwrap();
        let pom = String::from_utf8(pom).unwrap();
        assert!(pom.contains("<name>Apache &lt;2.0&gt; &amp; friends</name>"));
        assert!(pom.contains("<url>https://example.com/?a=1&amp;b=2</url>"));
        let management = pom.find("<dependencyManagement>").unwrap();
        let bom = pom.find("<artifactId>asm-bom</artifactId>").unwrap();
        let library = pom.find("<artifactId>asm</artifactId>").unwrap();
        assert!(management < bom && bom < library);
        assert!(pom.contains("<scope>import</scope>"));
    }
}
