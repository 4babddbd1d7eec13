use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{anyhow, bail};
use clap::{ArgAction, Parser};
use rbeconf_core::domain::{ExecOs, Options};
use rbeconf_core::BACKEND_ENV;

pub const RBECONF_BEFORE_HELP: &str = concat!(
    "rbeconf ",
    env!("CARGO_PKG_VERSION"),
    " – Remote build execution toolchain configs from a container image\n\n",
    "Starts the toolchain container, lets bazel detect the C++ toolchain inside it,\n",
    "probes the JDK and writes the resulting BUILD files as a tarball and/or a\n",
    "source tree, optionally with a manifest recording the image digest.\n",
);

#[derive(Parser, Debug)]
#[command(author, version, before_help = RBECONF_BEFORE_HELP)]
#[allow(clippy::struct_excessive_bools)]
pub struct RbeconfCli {
    #[arg(short, long, help = "Only log warnings and errors")]
    pub quiet: bool,
    #[arg(short, long, action = ArgAction::Count, help = "Increase logging (-vv reaches trace)")]
    pub verbose: u8,
    #[arg(long, help = "Force trace logging regardless of -v/-q")]
    pub trace: bool,
    #[arg(long, help = "Emit a {status,message,details} JSON envelope on stdout")]
    pub json: bool,
    #[arg(long, help = "Disable colored human output")]
    pub no_color: bool,

    #[arg(long, env = "RBECONF_BAZEL_VERSION", help = "Bazel version the configs are generated for")]
    pub bazel_version: Option<String>,
    #[arg(
        long,
        env = "RBECONF_TOOLCHAIN_CONTAINER",
        help = "Toolchain container image, e.g. gcr.io/my-project/rbe-image:latest"
    )]
    pub toolchain_container: Option<String>,
    #[arg(long, default_value = "linux", value_parser = parse_os, help = "OS of the toolchain container (linux|windows)")]
    pub exec_os: ExecOs,
    #[arg(long, value_parser = parse_os, help = "OS of the target platform [default: exec OS]")]
    pub target_os: Option<ExecOs>,

    #[arg(long, value_name = "PATH", help = "Write the configs as a tarball")]
    pub output_tarball: Option<PathBuf>,
    #[arg(long, value_name = "DIR", help = "Write the configs into this source tree")]
    pub output_src_root: Option<PathBuf>,
    #[arg(
        long,
        value_name = "REL_PATH",
        help = "Path of the configs relative to the source root; also prefixes the registered toolchain label"
    )]
    pub output_config_path: Option<String>,
    #[arg(long, value_name = "PATH", help = "Write a manifest describing the run")]
    pub output_manifest: Option<PathBuf>,

    #[arg(
        long,
        default_value_t = true,
        action = ArgAction::Set,
        value_name = "BOOL",
        help = "Generate C++ toolchain configs"
    )]
    pub generate_cpp_configs: bool,
    #[arg(
        long = "cpp-env",
        value_name = "KEY=VALUE",
        value_parser = parse_env_pair,
        help = "Environment variable for the C++ generation build (repeatable)"
    )]
    pub cpp_env: Vec<(String, String)>,
    #[arg(long, value_name = "PATH", help = "JSON object of extra environment variables for the C++ generation build")]
    pub cpp_env_json: Option<PathBuf>,
    #[arg(long = "cpp-config-target", value_name = "TARGET", help = "Target built to trigger C++ detection (repeatable)")]
    pub cpp_config_targets: Vec<String>,
    #[arg(long, value_name = "NAME", help = "Repository bazel writes the detected C++ configs to")]
    pub cpp_config_repo: Option<String>,
    #[arg(long, value_name = "CMD", help = "Bazel command used to trigger C++ detection")]
    pub cpp_bazel_cmd: Option<String>,

    #[arg(
        long,
        action = ArgAction::Set,
        value_name = "BOOL",
        help = "Generate Java toolchain configs [default: true on linux, false on windows]"
    )]
    pub generate_java_configs: Option<bool>,

    #[arg(long, value_name = "DIR", help = "Existing directory for intermediate files")]
    pub temp_work_dir: Option<PathBuf>,
    #[arg(
        long,
        default_value_t = true,
        action = ArgAction::Set,
        value_name = "BOOL",
        help = "Stop the container and delete intermediate files when done"
    )]
    pub cleanup: bool,
    #[arg(long, value_name = "DIR", help = "Working directory inside the container")]
    pub sandbox_workdir: Option<String>,
    #[arg(long, value_name = "PATH", help = "Use this bazelisk binary instead of downloading one")]
    pub launcher_path: Option<PathBuf>,
    #[arg(
        long,
        env = BACKEND_ENV,
        value_name = "PROGRAM",
        help = "Container engine program [default: docker, then podman]"
    )]
    pub container_backend: Option<String>,
}

impl RbeconfCli {
    /// Fills the per-OS defaults first and lays every flag that was given on top.
    pub fn to_options(&self) -> Options {
        let mut opts = Options::with_defaults(self.exec_os, self.target_os.unwrap_or(self.exec_os));
        opts.bazel_version = self.bazel_version.clone().unwrap_or_default();
        opts.toolchain_container = self.toolchain_container.clone().unwrap_or_default();

        opts.output_tarball = self.output_tarball.clone();
        opts.output_source_root = self.output_src_root.clone();
        opts.output_config_path = self.output_config_path.clone();
        opts.output_manifest = self.output_manifest.clone();

        opts.gen_cpp_configs = self.generate_cpp_configs;
        opts.cpp_gen_env = self.cpp_env.iter().cloned().collect::<BTreeMap<_, _>>();
        opts.cpp_gen_env_json = self.cpp_env_json.clone();
        if !self.cpp_config_targets.is_empty() {
            opts.cpp_config_targets = self.cpp_config_targets.clone();
        }
        if let Some(repo) = &self.cpp_config_repo {
            opts.cpp_config_repo = repo.clone();
        }
        if let Some(cmd) = &self.cpp_bazel_cmd {
            opts.cpp_bazel_cmd = cmd.clone();
        }
        if let Some(java) = self.generate_java_configs {
            opts.gen_java_configs = java;
        }

        opts.temp_work_dir = self.temp_work_dir.clone();
        opts.cleanup = self.cleanup;
        opts.sandbox_workdir = self.sandbox_workdir.clone();
        opts.launcher_path = self.launcher_path.clone();
        opts.container_backend = self
            .container_backend
            .clone()
            .filter(|program| !program.trim().is_empty());
        opts
    }
}

fn parse_os(raw: &str) -> anyhow::Result<ExecOs> {
    raw.parse().map_err(|err: String| anyhow!(err))
}

fn parse_env_pair(raw: &str) -> anyhow::Result<(String, String)> {
    let Some((key, value)) = raw.split_once('=') else {
        bail!("expected KEY=VALUE, got '{raw}'");
    };
    let key = key.trim();
    if key.is_empty() {
        bail!("environment variable name is empty in '{raw}'");
    }
    Ok((key.to_string(), value.to_string()))
}
