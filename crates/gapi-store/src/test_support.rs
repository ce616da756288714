use std::io::{Cursor, Write};

use zip::write::FileOptions;
use zip::ZipWriter;

fn jar(classes: &[&str]) -> Vec<u8> {
    let entries: Vec<(&str, &str)> = classes.iter().map(|class| (*class, *class)).collect();
    jar_with(&entries)
}

fn jar_with(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    writer
        .start_file("META-INF/MANIFEST.MF", FileOptions::default())
        .unwrap();
    writer.write_all(b"Manifest-Version: 1.0\r\n\r\n").unwrap();
    for (name, body) in entries {
        writer.start_file(*name, FileOptions::default()).unwrap();
        writer.write_all(body.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// A tiny `gradle-<version>` distribution zip with api, test-kit, wrapper and
/// groovy jars (no kotlin-dsl jar). The core api jar lists slf4j, gson and
/// groovy in its classpath manifest.
pub(crate) fn fake_distribution(version: &str, with_sources: bool) -> Vec<u8> {
    let root = format!("gradle-{version}");
    let mut files: Vec<(String, Vec<u8>)> = vec![
        (format!("{root}/bin/gradle"), b"#!/bin/sh\n".to_vec()),
        (
            format!("{root}/lib/gradle-core-api-{version}.jar"),
            jar_with(&[
                ("org/gradle/api/Project.class", "Project"),
                ("org/gradle/api/Action.class", "Action"),
                (
                    "gradle-core-api-classpath.properties",
                    "projects=gradle-base-services\nruntime=slf4j-api-2.0.9.jar,gson-2.10.1.jar,groovy-3.0.17.jar\n",
                ),
            ]),
        ),
        (
            format!("{root}/lib/slf4j-api-2.0.9.jar"),
            jar_with(&[
                ("org/slf4j/Logger.class", "Logger"),
                (
                    "META-INF/maven/org.slf4j/slf4j-api/pom.properties",
                    "groupId=org.slf4j\nartifactId=slf4j-api\nversion=2.0.9\n",
                ),
            ]),
        ),
        (
            format!("{root}/lib/gson-2.10.1.jar"),
            jar(&["com/google/gson/Gson.class"]),
        ),
        (
            format!("{root}/lib/gradle-wrapper-main-{version}.jar"),
            jar(&["org/gradle/wrapper/GradleWrapperMain.class"]),
        ),
        (
            format!("{root}/lib/plugins/gradle-test-kit-{version}.jar"),
            jar(&["org/gradle/testkit/runner/GradleRunner.class"]),
        ),
        (
            format!("{root}/lib/groovy-3.0.17.jar"),
            jar(&["groovy/lang/Closure.class"]),
        ),
    ];
    if with_sources {
        files.push((
            format!("{root}/src/core-api/org/gradle/api/Project.java"),
            b"public interface Project {}".to_vec(),
        ));
    }

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    writer
        .add_directory(format!("{root}/"), FileOptions::default())
        .unwrap();
    for (name, body) in files {
        writer.start_file(name, FileOptions::default()).unwrap();
        writer.write_all(&body).unwrap();
    }
    writer.finish().unwrap().into_inner()
}
