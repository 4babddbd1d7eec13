//! The end-to-end run: acquire a sandbox, extract, render, assemble, record.

use std::path::{Path, PathBuf};

use rbeconf_domain::{
    cpp_toolchain_target, render_platform_build, ConfigGenError, ConfigsManifest, GeneratedFile,
    Options, PlatformBuildParams, Result,
};
use serde::Serialize;
use tempfile::TempDir;

use crate::core::assemble::{compute_sha256, write_config_dir, write_config_tarball, write_manifest};
use crate::core::extract::{
    extract_cpp_configs, generate_java_build, install_launcher, CppRequest, LauncherSource,
};
use crate::core::sandbox::{detect_container_backend, ExecContext, Sandbox};

/// What a successful run produced.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationSummary {
    pub toolchain_container: String,
    pub resolved_image: String,
    pub exec_os_family: String,
    /// Logical paths of the generated files, in output order.
    pub generated: Vec<String>,
    pub cpp_configs: bool,
    pub output_tarball: Option<PathBuf>,
    pub tarball_sha256: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub output_manifest: Option<PathBuf>,
    /// Scratch directory left behind because cleanup was disabled.
    pub retained_work_dir: Option<PathBuf>,
}

enum WorkDir {
    /// Caller owned; never removed.
    Provided(PathBuf),
    /// Created here and removed at the end of a successful run.
    Owned(TempDir),
    /// Created here but kept because cleanup is disabled.
    Kept(PathBuf),
}

impl WorkDir {
    fn prepare(opts: &Options) -> Result<Self> {
        if let Some(dir) = &opts.temp_work_dir {
            if !dir.is_dir() {
                return Err(ConfigGenError::InvalidOptions(vec![format!(
                    "temp work dir {} does not exist or is not a directory",
                    dir.display()
                )]));
            }
            return Ok(Self::Provided(dir.clone()));
        }
        let dir = tempfile::Builder::new()
            .prefix("rbeconf_")
            .tempdir()
            .map_err(ConfigGenError::io("failed to create a local temporary directory"))?;
        if opts.cleanup {
            Ok(Self::Owned(dir))
        } else {
            Ok(Self::Kept(dir.keep()))
        }
    }

    fn path(&self) -> &Path {
        match self {
            Self::Provided(path) | Self::Kept(path) => path.as_path(),
            Self::Owned(dir) => dir.path(),
        }
    }

    fn finish(self) -> Option<PathBuf> {
        match self {
            Self::Provided(_) => None,
            Self::Kept(path) => Some(path),
            Self::Owned(dir) => {
                let path = dir.path().to_path_buf();
                if let Err(err) = dir.close() {
                    tracing::warn!(
                        path = %path.display(),
                        error = %err,
                        "unable to delete temporary working directory"
                    );
                }
                None
            }
        }
    }
}

/// Generates toolchain configs as described by `opts`.
///
/// Stages run strictly in order and the first failure aborts the run. The
/// sandbox is released on every path once acquired.
pub fn generate(opts: &Options) -> Result<GenerationSummary> {
    opts.validate()?;
    let work_dir = WorkDir::prepare(opts).map_err(|err| err.in_stage("prepare temp dir"))?;
    tracing::debug!(dir = %work_dir.path().display(), "using local working directory");

    let backend = detect_container_backend(opts.container_backend.as_deref())
        .map_err(|err| with_image(err, &opts.toolchain_container).in_stage("detect container engine"))?;
    tracing::info!(engine = backend.name(), program = %backend.program.display(), "using container engine");

    let sandbox = Sandbox::acquire(backend, &opts.toolchain_container, !opts.cleanup)
        .map_err(|err| err.in_stage("start toolchain container"))?;

    let workdir = opts.sandbox_workdir();
    let root = ExecContext::new();
    sandbox
        .exec(&root, &["mkdir", workdir])
        .map_err(|err| err.in_stage("create working directory in container"))?;
    let ctx = root.with_workdir(workdir);

    let cpp_bundle = if opts.gen_cpp_configs {
        let download = opts.exec_os.launcher();
        let source = match opts.launcher_path.as_deref() {
            Some(path) => LauncherSource::Local(path),
            None => LauncherSource::Download(download),
        };
        let launcher = install_launcher(&sandbox, &ctx, &source, download.file_name, work_dir.path())
            .map_err(|err| err.in_stage("install launcher"))?;
        let request = CppRequest {
            launcher: &launcher,
            bazel_version: &opts.bazel_version,
            bazel_cmd: &opts.cpp_bazel_cmd,
            targets: &opts.cpp_config_targets,
            repo: &opts.cpp_config_repo,
            gen_env: &opts.cpp_gen_env,
            gen_env_json: opts.cpp_gen_env_json.as_deref(),
        };
        let bundle = extract_cpp_configs(&sandbox, &ctx, &request, work_dir.path())
            .map_err(|err| err.in_stage("generate C++ configs"))?;
        Some(bundle)
    } else {
        tracing::info!("C++ config generation disabled; no toolchain target will be registered");
        None
    };

    let java_build = if opts.gen_java_configs {
        Some(
            generate_java_build(&sandbox, &ctx, &opts.bazel_version)
                .map_err(|err| err.in_stage("generate Java configs"))?,
        )
    } else {
        None
    };

    let config_path = opts.config_path();
    let params = PlatformBuildParams {
        platform: &opts.platform,
        cpp_toolchain_target: opts
            .gen_cpp_configs
            .then(|| cpp_toolchain_target(config_path.as_deref())),
        toolchain_container: sandbox.resolved_image(),
    };
    tracing::debug!(?params, "resolved platform params");
    let config_build = render_platform_build(&params);

    let generated: Vec<GeneratedFile> = java_build.into_iter().chain([config_build]).collect();

    let tarball = match &opts.output_tarball {
        Some(dest) => Some(
            write_config_tarball(dest, cpp_bundle.as_deref(), &generated)
                .map_err(|err| err.in_stage("assemble output tarball"))?,
        ),
        None => None,
    };
    let output_dir = opts.output_dir();
    if let Some(root) = &output_dir {
        write_config_dir(root, cpp_bundle.as_deref(), &generated)
            .map_err(|err| err.in_stage("assemble output directory"))?;
    }

    if let Some(path) = &opts.output_manifest {
        write_run_manifest(opts, sandbox.resolved_image(), tarball.as_ref().map(|t| t.path.as_path()), path)
            .map_err(|err| err.in_stage("write manifest"))?;
    }

    let summary = GenerationSummary {
        toolchain_container: opts.toolchain_container.clone(),
        resolved_image: sandbox.resolved_image().to_string(),
        exec_os_family: opts.platform.os_family.clone(),
        generated: generated.iter().map(|file| file.path.clone()).collect(),
        cpp_configs: cpp_bundle.is_some(),
        tarball_sha256: tarball.as_ref().map(|t| t.sha256.clone()),
        output_tarball: tarball.map(|t| t.path),
        output_dir,
        output_manifest: opts.output_manifest.clone(),
        retained_work_dir: None,
    };

    sandbox.release();
    let retained_work_dir = work_dir.finish();
    Ok(GenerationSummary {
        retained_work_dir,
        ..summary
    })
}

fn write_run_manifest(
    opts: &Options,
    resolved_image: &str,
    tarball: Option<&Path>,
    dest: &Path,
) -> Result<()> {
    let tarball_digest = tarball.map(compute_sha256).transpose()?;
    let manifest = ConfigsManifest::new(
        &opts.bazel_version,
        &opts.toolchain_container,
        resolved_image,
        &opts.platform.os_family,
        tarball_digest,
    )?;
    write_manifest(dest, &manifest)
}

fn with_image(err: ConfigGenError, image: &str) -> ConfigGenError {
    match err {
        ConfigGenError::SandboxUnavailable { reason, .. } => ConfigGenError::SandboxUnavailable {
            image: image.to_string(),
            reason,
        },
        other => other,
    }
}
