//! Third-party libraries behind the merged Gradle jars.
//!
//! Gradle module jars carry `<module>-classpath.properties` files listing the
//! jars they load at runtime. Those that Gradle itself ships (its own modules,
//! Groovy, Kotlin and the native integrations) are republished or bundled
//! already; the rest become POM dependencies, with a BOM import for the
//! families that publish one.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::io::{Cursor, Read, Seek};

use anyhow::{Context, Result};
use tracing::{debug, warn};
use zip::ZipArchive;

const CLASSPATH_SUFFIX: &str = "-classpath.properties";

/// Jar prefixes Gradle distributes as part of itself.
const BUNDLED_PREFIXES: &[&str] = &[
    "gradle-",
    "groovy-",
    "kotlin-",
    "native-platform-",
    "file-events-",
    "jansi-",
];

/// Group ids for libraries whose jars carry no `pom.properties`.
const KNOWN_GROUPS: &[(&str, &str)] = &[
    ("ant", "org.apache.ant"),
    ("jspecify", "org.jspecify"),
    ("jsr305", "com.google.code.findbugs"),
    ("javax.inject", "javax.inject"),
    ("xml-apis", "xml-apis"),
    ("asm", "org.ow2.asm"),
    ("jarjar", "com.googlecode.jarjar"),
    ("jna", "net.java.dev.jna"),
    ("objenesis", "org.objenesis"),
    ("ivy", "org.apache.ivy"),
    ("jcip-annotations", "net.jcip"),
    ("gson", "com.google.code.gson"),
    ("bcprov", "org.bouncycastle"),
    ("bcpg", "org.bouncycastle"),
    ("nekohtml", "net.sourceforge.nekohtml"),
    ("jcifs", "jcifs"),
    ("xercesImpl", "xerces"),
    ("junit", "junit"),
    ("hamcrest", "org.hamcrest"),
    ("rhino", "org.mozilla"),
    ("bndlib", "biz.aQute.bnd"),
    ("bsh", "org.beanshell"),
];

/// `(group, bom artifact, first version that has it)`.
const BOMS: &[(&str, &str, &str)] = &[
    ("org.slf4j", "slf4j-bom", "2.0.8"),
    ("org.ow2.asm", "asm-bom", "9.3"),
];

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct MavenDependency {
    pub group: String,
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LibraryDependencies {
    pub libraries: Vec<MavenDependency>,
    /// Imported into `<dependencyManagement>`.
    pub boms: Vec<MavenDependency>,
}

impl LibraryDependencies {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.libraries.is_empty() && self.boms.is_empty()
    }
}

/// Collects the libraries referenced by the classpath manifests of the
/// `gradle-*` jars in `matched`.
///
/// `entries` maps paths relative to the distribution root to their index in
/// `archive`. Referenced jars missing from the distribution are ignored, as are
/// jars whose group cannot be determined.
pub fn infer_dependencies<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    entries: &BTreeMap<String, usize>,
    matched: &[String],
) -> Result<LibraryDependencies> {
    let mut referenced = BTreeSet::new();
    for relative in matched {
        let (dir, file) = relative.rsplit_once('/').unwrap_or(("", relative.as_str()));
        if !file.starts_with("gradle-") {
            continue;
        }
        let mut jar = open_nested(archive, entries[relative])
            .with_context(|| format!("failed to open {relative}"))?;
        for jar_name in classpath_jars(&mut jar)? {
            if BUNDLED_PREFIXES.iter().any(|prefix| jar_name.starts_with(prefix)) {
                continue;
            }
            let candidates = [format!("{dir}/{jar_name}"), format!("lib/{jar_name}")];
            match candidates.into_iter().find(|path| entries.contains_key(path)) {
                Some(path) => {
                    referenced.insert(path);
                }
                None => {
                    debug!(jar = %jar_name, from = %relative, "classpath jar not in distribution")
                }
            }
        }
    }

    let mut libraries = BTreeSet::new();
    let mut boms = BTreeSet::new();
    for path in referenced {
        let file = path.rsplit('/').next().unwrap_or(&path);
        let Some((name, version)) = split_jar_name(file) else {
            warn!(jar = %path, "cannot tell name from version; leaving it out of the POM");
            continue;
        };
        if version.ends_with("-SNAPSHOT") {
            debug!(jar = %path, "skipping snapshot library");
            continue;
        }
        let mut jar = open_nested(archive, entries[&path])
            .with_context(|| format!("failed to open {path}"))?;
        let Some(group) = pom_group(&mut jar, name)?.or_else(|| known_group(name)) else {
            warn!(jar = %path, "unknown group id; leaving it out of the POM");
            continue;
        };
        if let Some(bom) = bom_for(&group, version) {
            boms.insert(bom);
        }
        libraries.insert(MavenDependency {
            group,
            name: name.to_string(),
            version: version.to_string(),
        });
    }

    Ok(LibraryDependencies {
        libraries: libraries.into_iter().collect(),
        boms: boms.into_iter().collect(),
    })
}

fn open_nested<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    index: usize,
) -> Result<ZipArchive<Cursor<Vec<u8>>>> {
    let mut entry = archive.by_index(index)?;
    let mut bytes = Vec::with_capacity(usize::try_from(entry.size()).unwrap_or_default());
    entry.read_to_end(&mut bytes)?;
    Ok(ZipArchive::new(Cursor::new(bytes))?)
}

/// Jar file names listed in every top-level `*-classpath.properties` entry.
fn classpath_jars<R: Read + Seek>(jar: &mut ZipArchive<R>) -> Result<BTreeSet<String>> {
    let manifests: Vec<String> = jar
        .file_names()
        .filter(|name| !name.contains('/') && name.ends_with(CLASSPATH_SUFFIX))
        .map(ToOwned::to_owned)
        .collect();
    let mut jars = BTreeSet::new();
    for manifest in manifests {
        let mut text = String::new();
        jar.by_name(&manifest)?
            .read_to_string(&mut text)
            .with_context(|| format!("failed to read {manifest}"))?;
        for value in parse_properties(&text).into_values() {
            jars.extend(
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|item| item.ends_with(".jar"))
                    .map(ToOwned::to_owned),
            );
        }
    }
    Ok(jars)
}

/// `groupId` from `META-INF/maven/<group>/<name>/pom.properties`.
fn pom_group<R: Read + Seek>(jar: &mut ZipArchive<R>, name: &str) -> Result<Option<String>> {
    let suffix = format!("/{name}/pom.properties");
    let Some(entry) = jar
        .file_names()
        .find(|entry| entry.starts_with("META-INF/maven/") && entry.ends_with(&suffix))
        .map(ToOwned::to_owned)
    else {
        return Ok(None);
    };
    let mut text = String::new();
    jar.by_name(&entry)?.read_to_string(&mut text)?;
    Ok(parse_properties(&text)
        .remove("groupId")
        .filter(|group| !group.is_empty()))
}

fn known_group(name: &str) -> Option<String> {
    let prefixed = format!("{name}-");
    KNOWN_GROUPS
        .iter()
        .find(|(base, _)| prefixed.starts_with(&format!("{base}-")))
        .map(|(_, group)| (*group).to_string())
}

fn bom_for(group: &str, version: &str) -> Option<MavenDependency> {
    BOMS.iter()
        .find(|(bom_group, _, since)| {
            *bom_group == group && compare_versions(version, since) != Ordering::Less
        })
        .map(|(bom_group, bom, _)| MavenDependency {
            group: (*bom_group).to_string(),
            name: (*bom).to_string(),
            version: version.to_string(),
        })
}

/// `commons-lang3-3.12.0.jar` → `("commons-lang3", "3.12.0")`: the version
/// starts at the first `-` followed by a digit.
fn split_jar_name(file: &str) -> Option<(&str, &str)> {
    let stem = file.strip_suffix(".jar")?;
    let split = stem
        .match_indices('-')
        .map(|(index, _)| index)
        .find(|index| stem[index + 1..].starts_with(|c: char| c.is_ascii_digit()))?;
    Some((&stem[..split], &stem[split + 1..]))
}

/// Numeric comparison of dotted versions; qualifiers after `-` are ignored.
fn compare_versions(left: &str, right: &str) -> Ordering {
    let numbers = |text: &str| -> Vec<u64> {
        text.split('-')
            .next()
            .unwrap_or_default()
            .split('.')
            .map(|part| {
                let digits: String = part.chars().take_while(char::is_ascii_digit).collect();
                digits.parse().unwrap_or(0)
            })
            .collect()
    };
    let (left, right) = (numbers(left), numbers(right));
    for index in 0..left.len().max(right.len()) {
        let ordering = left
            .get(index)
            .unwrap_or(&0)
            .cmp(right.get(index).unwrap_or(&0));
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// The subset of the `.properties` format Gradle and Maven write: one
/// `key=value` (or `key:value`) per line, `#`/`!` comments and trailing `\`
/// continuations.
fn parse_properties(text: &str) -> BTreeMap<String, String> {
    let mut properties = BTreeMap::new();
    let mut logical = String::new();
    for line in text.lines() {
        let line = line.trim_start();
        if logical.is_empty()
            && (line.is_empty() || line.starts_with('#') || line.starts_with('!'))
        {
            continue;
        }
        if let Some(continued) = line.strip_suffix('\\') {
            logical.push_str(continued);
            continue;
        }
        logical.push_str(line);
        let entry = std::mem::take(&mut logical);
        let (key, value) = match entry.find(['=', ':']) {
            Some(index) => (&entry[..index], &entry[index + 1..]),
            None => (entry.as_str(), ""),
        };
        properties.insert(key.trim().to_string(), value.trim().to_string());
    }
    properties
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use zip::write::FileOptions;
    use zip::ZipWriter;

    use super::*;

    fn zip_of(entries: &[(&str, Vec<u8>)]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, body) in entries {
            writer.start_file(*name, FileOptions::default()).unwrap();
            writer.write_all(body).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn splits_names_and_versions() {
        assert_eq!(split_jar_name("slf4j-api-2.0.9.jar"), Some(("slf4j-api", "2.0.9")));
        assert_eq!(split_jar_name("commons-lang3-3.12.0.jar"), Some(("commons-lang3", "3.12.0")));
        assert_eq!(split_jar_name("bcprov-jdk18on-1.76.jar"), Some(("bcprov-jdk18on", "1.76")));
        assert_eq!(split_jar_name("unversioned.jar"), None);
        assert_eq!(split_jar_name("notes.txt"), None);
    }

    #[test]
    fn compares_dotted_versions() {
        assert_eq!(compare_versions("2.0.9", "2.0.8"), Ordering::Greater);
        assert_eq!(compare_versions("9.3", "9.3.0"), Ordering::Equal);
        assert_eq!(compare_versions("1.7.36", "2.0.8"), Ordering::Less);
        assert_eq!(compare_versions("9.5-rc1", "9.3"), Ordering::Greater);
    }

    #[test]
    fn parses_properties_with_continuations() {
        let parsed = parse_properties(
            "# generated\nprojects=gradle-base-services\nruntime=a-1.jar,\\\n    b-2.jar\n\n! note\ngroupId: org.example\n",
        );
        assert_eq!(parsed["projects"], "gradle-base-services");
        assert_eq!(parsed["runtime"], "a-1.jar,b-2.jar");
        assert_eq!(parsed["groupId"], "org.example");
        assert_eq!(parsed.len(), 3);
    }

    #[test]
    fn follows_classpath_manifests_to_library_coordinates() {
        let gradle_jar = zip_of(&[
            ("org/gradle/api/Project.class", b"x".to_vec()),
            (
                "gradle-core-api-classpath.properties",
                b"projects=gradle-base-services\nruntime=slf4j-api-1.7.36.jar,asm-9.5.jar,groovy-3.0.17.jar,mystery-1.0.jar,absent-2.0.jar\n"
                    .to_vec(),
            ),
        ]);
        let slf4j = zip_of(&[(
            "META-INF/maven/org.slf4j/slf4j-api/pom.properties",
            b"groupId=org.slf4j\nartifactId=slf4j-api\nversion=1.7.36\n".to_vec(),
        )]);
        let distribution = zip_of(&[
            ("gradle-8.2/lib/plugins/gradle-core-api-8.2.jar", gradle_jar),
            ("gradle-8.2/lib/slf4j-api-1.7.36.jar", slf4j),
            (
                "gradle-8.2/lib/plugins/asm-9.5.jar",
                zip_of(&[("org/objectweb/asm/A.class", b"a".to_vec())]),
            ),
            (
                "gradle-8.2/lib/groovy-3.0.17.jar",
                zip_of(&[("groovy/lang/Closure.class", b"g".to_vec())]),
            ),
            ("gradle-8.2/lib/mystery-1.0.jar", zip_of(&[("m/M.class", b"m".to_vec())])),
        ]);
        let mut archive = ZipArchive::new(Cursor::new(distribution)).unwrap();
        let entries: BTreeMap<String, usize> = (0..archive.len())
            .map(|index| {
                let name = archive.by_index(index).unwrap().name().to_string();
                (name.split_once('/').unwrap().1.to_string(), index)
            })
            .collect();

        let found = infer_dependencies(
            &mut archive,
            &entries,
            &["lib/plugins/gradle-core-api-8.2.jar".to_string()],
        )
        .unwrap();
        let coordinates: Vec<String> = found
            .libraries
            .iter()
            .map(|dep| format!("{}:{}:{}", dep.group, dep.name, dep.version))
            .collect();
        // asm sits next to the module jar, slf4j is found through lib/.
        assert_eq!(coordinates, ["org.ow2.asm:asm:9.5", "org.slf4j:slf4j-api:1.7.36"]);
        assert_eq!(
            found.boms,
            [MavenDependency {
                group: "org.ow2.asm".into(),
                name: "asm-bom".into(),
                version: "9.5".into(),
            }]
        );
    }
}
