#![allow(dead_code)]

use std::fs::{self, File};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use assert_cmd::assert::Assert;
use serde_json::Value;
use zip::write::FileOptions;
use zip::ZipWriter;

fn jar(classes: &[&str]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for class in classes {
        writer.start_file(*class, FileOptions::default()).expect("jar entry");
        writer.write_all(class.as_bytes()).expect("jar body");
    }
    writer.finish().expect("finish jar").into_inner()
}

/// Writes `gradle-<version>-bin.zip` with api and test-kit jars into `dir`.
pub fn write_distribution(dir: &Path, version: &str) -> PathBuf {
    fs::create_dir_all(dir).expect("distribution dir");
    let path = dir.join(format!("gradle-{version}-bin.zip"));
    let mut writer = ZipWriter::new(File::create(&path).expect("create zip"));
    let root = format!("gradle-{version}");
    let entries = [
        (
            format!("{root}/lib/gradle-core-api-{version}.jar"),
            jar(&["org/gradle/api/Project.class", "org/gradle/api/Action.class"]),
        ),
        (
            format!("{root}/lib/plugins/gradle-test-kit-{version}.jar"),
            jar(&["org/gradle/testkit/runner/GradleRunner.class"]),
        ),
        (format!("{root}/bin/gradle"), b"#!/bin/sh\n".to_vec()),
    ];
    for (name, body) in entries {
        writer.start_file(name, FileOptions::default()).expect("zip entry");
        writer.write_all(&body).expect("zip body");
    }
    writer.finish().expect("finish zip");
    path
}

pub fn parse_json(assert: &Assert) -> Value {
    let output = assert.get_output();
    serde_json::from_slice(&output.stdout).unwrap_or_else(|err| {
        panic!(
            "invalid JSON ({err}): {}",
            String::from_utf8_lossy(&output.stdout)
        )
    })
}
