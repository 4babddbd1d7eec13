//! BUILD file text for the generated configs.
//!
//! Rendering is plain string building over fixed templates so that identical
//! facts always produce identical bytes.

use std::fmt::Write as _;

use semver::Version;
use serde::Serialize;

use crate::error::{ConfigGenError, Result};
use crate::options::PlatformParams;

const BUILD_HEADER: &str = "\
# This file is auto-generated by rbeconf and should not be modified directly.
# Regenerate it by running rbeconf against the toolchain container instead.
";

pub const CONFIG_BUILD_PATH: &str = "config/BUILD";
pub const JAVA_BUILD_PATH: &str = "java/BUILD";

const CC_TOOLCHAIN_TYPE: &str = "@bazel_tools//tools/cpp:toolchain_type";
const CC_COMPILER_TARGET: &str = "cc:cc-compiler-k8";

/// Bazel releases at or above this one get the `local_java_runtime` layout.
pub const JAVA_RUNTIME_THRESHOLD: Version = Version::new(4, 1, 0);

/// One file to place in the output, addressed by its path relative to the
/// config root.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GeneratedFile {
    pub path: String,
    #[serde(skip)]
    pub contents: Vec<u8>,
}

impl GeneratedFile {
    #[must_use]
    pub fn new(path: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            contents: contents.into(),
        }
    }
}

/// Label of the C++ toolchain the platform BUILD file registers, rooted under
/// the cleaned output config path when one is set.
#[must_use]
pub fn cpp_toolchain_target(config_path: Option<&str>) -> String {
    match config_path.filter(|p| !p.is_empty()) {
        Some(path) => format!("//{path}/{CC_COMPILER_TARGET}"),
        None => format!("//{CC_COMPILER_TARGET}"),
    }
}

/// Everything the platform BUILD file is rendered from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PlatformBuildParams<'a> {
    pub platform: &'a PlatformParams,
    /// `None` when C++ configs were not generated; the toolchain stanza is
    /// omitted entirely.
    pub cpp_toolchain_target: Option<String>,
    /// Digest-qualified image reference.
    pub toolchain_container: &'a str,
}

fn write_label_list(out: &mut String, labels: &[String]) {
    for label in labels {
        let _ = writeln!(out, "        \"{label}\",");
    }
}

/// Renders `config/BUILD`: an optional C++ toolchain registration plus the
/// default platform definition.
#[must_use]
pub fn render_platform_build(params: &PlatformBuildParams<'_>) -> GeneratedFile {
    let mut out = String::from(BUILD_HEADER);
    out.push_str("\npackage(default_visibility = [\"//visibility:public\"])\n");

    if let Some(target) = &params.cpp_toolchain_target {
        out.push_str("\ntoolchain(\n    name = \"cc-toolchain\",\n    exec_compatible_with = [\n");
        write_label_list(&mut out, &params.platform.exec_constraints);
        out.push_str("    ],\n    target_compatible_with = [\n");
        write_label_list(&mut out, &params.platform.target_constraints);
        let _ = write!(
            out,
            "    ],\n    toolchain = \"{target}\",\n    toolchain_type = \"{CC_TOOLCHAIN_TYPE}\",\n)\n"
        );
    }

    out.push_str(
        "\nplatform(\n    name = \"platform\",\n    parents = [\"@local_config_platform//:host\"],\n    constraint_values = [\n",
    );
    write_label_list(&mut out, &params.platform.exec_constraints);
    let _ = write!(
        out,
        "    ],\n    exec_properties = {{\n        \"container-image\": \"docker://{}\",\n        \"OSFamily\": \"{}\",\n    }},\n)\n",
        params.toolchain_container, params.platform.os_family
    );

    GeneratedFile::new(CONFIG_BUILD_PATH, out)
}

/// Layout of the Java runtime BUILD file, chosen by Bazel version.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JavaBuildVariant {
    /// A single inline `java_runtime` target.
    Legacy,
    /// `local_java_runtime` behind a `jdk` alias, carrying the runtime version.
    Current,
}

impl JavaBuildVariant {
    /// Strict threshold: anything below 4.1.0 (pre-releases of 4.1.0 included)
    /// is legacy.
    pub fn select(bazel_version: &str) -> Result<Self> {
        let version = Version::parse(bazel_version.trim()).map_err(|source| {
            ConfigGenError::InvalidVersion {
                version: bazel_version.to_string(),
                source,
            }
        })?;
        Ok(Self::for_version(&version))
    }

    #[must_use]
    pub fn for_version(version: &Version) -> Self {
        if *version < JAVA_RUNTIME_THRESHOLD {
            Self::Legacy
        } else {
            Self::Current
        }
    }

    #[must_use]
    pub fn render(self, java_home: &str, java_version: &str) -> GeneratedFile {
        let body = match self {
            Self::Legacy => format!(
                "\npackage(default_visibility = [\"//visibility:public\"])\n\n\
                 java_runtime(\n    name = \"jdk\",\n    srcs = [],\n    java_home = \"{java_home}\",\n)\n"
            ),
            Self::Current => format!(
                "\nload(\"@bazel_tools//tools/jdk:local_java_repository.bzl\", \"local_java_runtime\")\n\n\
                 package(default_visibility = [\"//visibility:public\"])\n\n\
                 alias(\n    name = \"jdk\",\n    actual = \"rbe_jdk\",\n)\n\n\
                 local_java_runtime(\n    name = \"rbe_jdk\",\n    java_home = \"{java_home}\",\n    version = \"{java_version}\",\n)\n"
            ),
        };
        GeneratedFile::new(JAVA_BUILD_PATH, format!("{BUILD_HEADER}{body}"))
    }
}
