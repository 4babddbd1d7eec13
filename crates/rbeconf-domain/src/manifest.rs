use std::fmt::Write as _;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::error::{ConfigGenError, Result};

fn digest_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"sha256:([a-f0-9]{64})$").expect("valid digest regex"))
}

/// Pulls the hex digest out of a reference ending in `sha256:<64 hex>`.
pub fn image_digest(resolved_reference: &str) -> Result<String> {
    digest_regex()
        .captures(resolved_reference)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| ConfigGenError::DigestExtractionFailed {
            reference: resolved_reference.to_string(),
        })
}

/// Provenance record of one generation run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConfigsManifest {
    pub bazel_version: String,
    /// Image reference as the caller gave it, before resolution.
    pub toolchain_container: String,
    pub image_digest: String,
    pub exec_os_family: String,
    pub configs_tarball_digest: Option<String>,
}

impl ConfigsManifest {
    /// Fails with `DigestExtractionFailed` unless `resolved_reference` is
    /// digest-qualified.
    pub fn new(
        bazel_version: &str,
        toolchain_container: &str,
        resolved_reference: &str,
        exec_os_family: &str,
        configs_tarball_digest: Option<String>,
    ) -> Result<Self> {
        Ok(Self {
            bazel_version: bazel_version.to_string(),
            toolchain_container: toolchain_container.to_string(),
            image_digest: image_digest(resolved_reference)?,
            exec_os_family: exec_os_family.to_string(),
            configs_tarball_digest,
        })
    }

    /// `Key=Value` lines in fixed order, newline terminated.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "BazelVersion={}", self.bazel_version);
        let _ = writeln!(out, "ToolchainContainer={}", self.toolchain_container);
        let _ = writeln!(out, "ImageDigest={}", self.image_digest);
        let _ = writeln!(out, "ExecPlatformOS={}", self.exec_os_family);
        if let Some(digest) = &self.configs_tarball_digest {
            let _ = writeln!(out, "ConfigsTarballDigest={digest}");
        }
        out
    }
}
