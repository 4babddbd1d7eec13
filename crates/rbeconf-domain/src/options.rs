use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigGenError, Result};

/// Operating system of the toolchain container (execution platform) or of the
/// target platform.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecOs {
    #[default]
    Linux,
    Windows,
}

/// Where the build launcher for an OS is published and what it is called once
/// downloaded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LauncherDownload {
    pub url: &'static str,
    pub file_name: &'static str,
}

impl ExecOs {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Windows => "windows",
        }
    }

    /// Root working directory used for commands inside the toolchain container.
    #[must_use]
    pub fn sandbox_workdir(self) -> &'static str {
        match self {
            Self::Linux => "/workdir",
            Self::Windows => "C:/workdir",
        }
    }

    #[must_use]
    pub fn launcher(self) -> LauncherDownload {
        match self {
            Self::Linux => LauncherDownload {
                url: concat!(
                    "https://github.com/bazelbuild/bazelisk/releases/download/v1.7.4",
                    "/bazelisk-linux-amd64"
                ),
                file_name: "bazelisk",
            },
            Self::Windows => LauncherDownload {
                url: concat!(
                    "https://github.com/bazelbuild/bazelisk/releases/download/v1.7.4",
                    "/bazelisk-windows-amd64.exe"
                ),
                file_name: "bazelisk.exe",
            },
        }
    }

    #[must_use]
    pub fn os_family(self) -> &'static str {
        match self {
            Self::Linux => "Linux",
            Self::Windows => "Windows",
        }
    }

    fn exec_constraints(self) -> Vec<String> {
        let mut constraints = self.target_constraints();
        if self == Self::Linux {
            constraints.push("@bazel_tools//tools/cpp:clang".to_string());
        }
        constraints
    }

    fn target_constraints(self) -> Vec<String> {
        let os = match self {
            Self::Linux => "@bazel_tools//platforms:linux",
            Self::Windows => "@bazel_tools//platforms:windows",
        };
        vec![os.to_string(), "@bazel_tools//platforms:x86_64".to_string()]
    }
}

impl fmt::Display for ExecOs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecOs {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linux" => Ok(Self::Linux),
            "windows" => Ok(Self::Windows),
            other => Err(format!(
                "unsupported OS '{other}' (expected 'linux' or 'windows')"
            )),
        }
    }
}

/// Constraint sets and labels written into the generated platform definition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformParams {
    pub exec_constraints: Vec<String>,
    pub target_constraints: Vec<String>,
    pub os_family: String,
}

impl PlatformParams {
    #[must_use]
    pub fn for_os(exec_os: ExecOs, target_os: ExecOs) -> Self {
        Self {
            exec_constraints: exec_os.exec_constraints(),
            target_constraints: target_os.target_constraints(),
            os_family: exec_os.os_family().to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Options {
    pub bazel_version: String,
    pub toolchain_container: String,
    pub exec_os: ExecOs,
    pub target_os: ExecOs,
    pub platform: PlatformParams,

    pub output_tarball: Option<PathBuf>,
    pub output_source_root: Option<PathBuf>,
    /// Relative path under `output_source_root` (and inside the generated
    /// labels) where the configs live.
    pub output_config_path: Option<String>,
    pub output_manifest: Option<PathBuf>,

    pub gen_cpp_configs: bool,
    pub cpp_gen_env: BTreeMap<String, String>,
    pub cpp_gen_env_json: Option<PathBuf>,
    pub cpp_config_targets: Vec<String>,
    pub cpp_config_repo: String,
    pub cpp_bazel_cmd: String,

    pub gen_java_configs: bool,

    pub temp_work_dir: Option<PathBuf>,
    /// Stop the container and delete self-created scratch space when done.
    pub cleanup: bool,
    pub sandbox_workdir: Option<String>,
    pub launcher_path: Option<PathBuf>,
    pub container_backend: Option<String>,
}

impl Options {
    /// Options with every per-OS default filled in. The caller still has to
    /// supply the version, the container and at least one output.
    #[must_use]
    pub fn with_defaults(exec_os: ExecOs, target_os: ExecOs) -> Self {
        let (cpp_bazel_cmd, gen_java_configs) = match exec_os {
            ExecOs::Linux => ("build", true),
            ExecOs::Windows => ("query", false),
        };
        Self {
            bazel_version: String::new(),
            toolchain_container: String::new(),
            exec_os,
            target_os,
            platform: PlatformParams::for_os(exec_os, target_os),
            output_tarball: None,
            output_source_root: None,
            output_config_path: None,
            output_manifest: None,
            gen_cpp_configs: true,
            cpp_gen_env: BTreeMap::new(),
            cpp_gen_env_json: None,
            cpp_config_targets: vec!["@local_config_cc//...".to_string()],
            cpp_config_repo: "local_config_cc".to_string(),
            cpp_bazel_cmd: cpp_bazel_cmd.to_string(),
            gen_java_configs,
            temp_work_dir: None,
            cleanup: true,
            sandbox_workdir: None,
            launcher_path: None,
            container_backend: None,
        }
    }

    /// Reports every problem at once instead of stopping at the first.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();
        if self.bazel_version.trim().is_empty() {
            problems.push("bazel version was not specified".to_string());
        }
        if self.toolchain_container.trim().is_empty() {
            problems.push("toolchain container was not specified".to_string());
        }
        if self.output_tarball.is_none() && self.output_source_root.is_none() {
            problems.push(
                "at least one of an output tarball or an output source root is required".to_string(),
            );
        }
        if let Some(config_path) = &self.output_config_path {
            if clean_config_path(config_path).is_none() {
                problems.push(format!(
                    "output config path '{config_path}' must be relative and stay inside the output root"
                ));
            }
        }
        if self.gen_cpp_configs {
            if self.cpp_config_targets.iter().all(|t| t.trim().is_empty()) {
                problems.push("C++ config generation needs at least one target".to_string());
            }
            if self.cpp_config_repo.trim().is_empty() {
                problems.push("C++ config generation needs a repository name".to_string());
            }
            if self.cpp_bazel_cmd.trim().is_empty() {
                problems.push("C++ config generation needs a bazel command".to_string());
            }
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigGenError::InvalidOptions(problems))
        }
    }

    /// In-sandbox working directory: the explicit override or the OS default.
    #[must_use]
    pub fn sandbox_workdir(&self) -> &str {
        self.sandbox_workdir
            .as_deref()
            .unwrap_or_else(|| self.exec_os.sandbox_workdir())
    }

    /// Normalised `output_config_path`, `None` when unset or empty.
    #[must_use]
    pub fn config_path(&self) -> Option<String> {
        self.output_config_path
            .as_deref()
            .and_then(clean_config_path)
            .filter(|p| !p.is_empty())
    }

    /// Root directory for the directory output, if one was requested.
    #[must_use]
    pub fn output_dir(&self) -> Option<PathBuf> {
        let root = self.output_source_root.as_ref()?;
        Some(match self.config_path() {
            Some(sub) => root.join(sub),
            None => root.clone(),
        })
    }
}

/// Normalises a relative, slash-separated config path: drops `.` segments and
/// redundant separators. Returns `None` for absolute paths and paths that climb
/// out with `..`.
#[must_use]
pub fn clean_config_path(raw: &str) -> Option<String> {
    let path = Path::new(raw.trim());
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?.to_string()),
            Component::CurDir => {}
            Component::ParentDir => {
                parts.pop()?;
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(parts.join("/"))
}
