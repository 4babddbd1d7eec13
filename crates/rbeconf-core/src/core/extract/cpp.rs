use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use rbeconf_domain::{ConfigGenError, Result};

use super::launcher::join_remote;
use crate::core::sandbox::{ExecContext, Sandbox};

pub const BAZEL_VERSION_ENV: &str = "USE_BAZEL_VERSION";
const PROJECT_DIR: &str = "cpp_configs_project";
const BUNDLE_NAME: &str = "cpp_configs.tar";

/// What to build and where to find the result.
#[derive(Clone, Debug)]
pub struct CppRequest<'a> {
    /// Launcher path inside the sandbox.
    pub launcher: &'a str,
    pub bazel_version: &'a str,
    pub bazel_cmd: &'a str,
    pub targets: &'a [String],
    pub repo: &'a str,
    pub gen_env: &'a BTreeMap<String, String>,
    pub gen_env_json: Option<&'a Path>,
}

/// Environment for the generation build: the pinned bazel version, then the
/// inline variables, then the JSON file's variables, each group sorted by key.
pub fn generation_env(
    bazel_version: &str,
    inline: &BTreeMap<String, String>,
    json_file: Option<&Path>,
) -> Result<Vec<(String, String)>> {
    let mut env = vec![(BAZEL_VERSION_ENV.to_string(), bazel_version.to_string())];
    env.extend(inline.iter().map(|(k, v)| (k.clone(), v.clone())));
    if let Some(path) = json_file {
        let blob = fs::read_to_string(path).map_err(ConfigGenError::io(format!(
            "unable to read C++ generation environment file {}",
            path.display()
        )))?;
        let from_file: BTreeMap<String, String> =
            serde_json::from_str(&blob).map_err(|source| ConfigGenError::EnvJson {
                path: path.to_path_buf(),
                source,
            })?;
        env.extend(from_file);
    }
    Ok(env)
}

/// Builds the C++ toolchain detection targets inside the sandbox, hardens the
/// generated tree and copies it out as a tarball into `local_dir`.
///
/// `ctx` must carry the sandbox root working directory; every command here
/// runs from a fresh project directory below it.
pub fn extract_cpp_configs(
    sandbox: &Sandbox,
    ctx: &ExecContext,
    request: &CppRequest<'_>,
    local_dir: &Path,
) -> Result<PathBuf> {
    let project_dir = join_remote(ctx.workdir().unwrap_or_default(), PROJECT_DIR);
    sandbox.exec(ctx, &["mkdir", project_dir.as_str()])?;
    let project = ctx.with_workdir(project_dir.clone());
    sandbox.exec(&project, &["touch", "WORKSPACE", "BUILD.bazel"])?;

    let gen_env = generation_env(request.bazel_version, request.gen_env, request.gen_env_json)?;
    let build = project.with_env(gen_env);
    let mut build_args = vec![request.launcher.to_string(), request.bazel_cmd.to_string()];
    build_args.extend(request.targets.iter().cloned());
    sandbox.exec(&build, &build_args).map_err(|err| match err {
        ConfigGenError::CommandFailed {
            command,
            code,
            output,
            ..
        } => ConfigGenError::BuildFailed {
            command,
            code,
            output,
        },
        other => other,
    })?;

    let info = project.with_env([(BAZEL_VERSION_ENV, request.bazel_version)]);
    let info_output = sandbox.exec_stdout(&info, &[request.launcher, "info", "output_base"])?;
    let output_base = last_line(&info_output).ok_or_else(|| {
        ConfigGenError::ProtocolViolation("`info output_base` printed nothing".to_string())
    })?;
    let config_dir = format!("{output_base}/external/{}", request.repo);
    tracing::info!(dir = %config_dir, "extracting C++ configs generated by bazel");

    let hardened = harden_symlinks(sandbox, &project, &config_dir)?;
    tracing::debug!(links = hardened, "hardened symlinks");

    let remote_bundle = join_remote(&project_dir, BUNDLE_NAME);
    sandbox.exec(
        &project,
        &["tar", "-cf", remote_bundle.as_str(), "-C", config_dir.as_str(), "."],
    )?;
    let local_bundle = local_dir.join(BUNDLE_NAME);
    sandbox.copy_out(&remote_bundle, &local_bundle)?;
    tracing::info!(path = %local_bundle.display(), "generated C++ configs");
    Ok(local_bundle)
}

/// Replaces every symlink under `dir` with a copy of the file at the end of
/// its link chain. A tree without links is left alone, so running this twice
/// is the same as running it once. Returns how many links were replaced.
pub fn harden_symlinks(sandbox: &Sandbox, ctx: &ExecContext, dir: &str) -> Result<usize> {
    let listing = sandbox.exec_stdout(ctx, &["find", dir, "-type", "l"])?;
    let mut hardened = 0;
    for link in listing.lines().map(str::trim).filter(|line| !line.is_empty()) {
        let target = sandbox.exec_stdout(ctx, &["readlink", "-f", link])?;
        let target = target.trim();
        sandbox.exec(ctx, &["cp", "--remove-destination", target, link])?;
        tracing::debug!(link, target, "hardened symlink");
        hardened += 1;
    }
    Ok(hardened)
}

fn last_line(output: &str) -> Option<&str> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .last()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_env_orders_version_inline_then_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let json = dir.path().join("env.json");
        fs::write(&json, r#"{"Z_FROM_FILE": "z", "CC": "gcc"}"#).expect("write json");
        let inline: BTreeMap<String, String> = [("CC", "clang"), ("BAZEL_USE_CPP_ONLY_TOOLCHAIN", "1")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        let env = generation_env("4.2.0", &inline, Some(&json)).expect("env");
        let keys: Vec<&str> = env.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "USE_BAZEL_VERSION",
                "BAZEL_USE_CPP_ONLY_TOOLCHAIN",
                "CC",
                "CC",
                "Z_FROM_FILE"
            ]
        );
        assert_eq!(env[0].1, "4.2.0");
        assert_eq!(env[3].1, "gcc");
    }

    #[test]
    fn malformed_env_json_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let json = dir.path().join("env.json");
        fs::write(&json, r#"{"CC": 1}"#).expect("write json");
        let err = generation_env("4.2.0", &BTreeMap::new(), Some(&json)).expect_err("not a string map");
        assert!(matches!(err, ConfigGenError::EnvJson { .. }));
        assert!(err.is_user_error());
    }

    #[test]
    fn last_line_skips_trailing_blanks() {
        assert_eq!(last_line("Starting server\n/root/.cache/bazel/_bazel_root/abc\n\n"), Some("/root/.cache/bazel/_bazel_root/abc"));
        assert_eq!(last_line("  \n"), None);
    }
}
