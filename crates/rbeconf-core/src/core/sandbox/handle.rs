use std::collections::BTreeMap;
use std::path::Path;

use rbeconf_domain::{parse_declared_env, ConfigGenError, Result};

use super::backend::ContainerBackend;
use super::context::ExecContext;
use crate::core::process::{display_command, run_command, RunOutput};

const CONTAINER_ID_LEN: usize = 64;
const DIGEST_FORMAT: &str = "--format={{index .RepoDigests 0}}";
const ENV_FORMAT: &str = "{{range $i, $v := .Config.Env}}{{println $v}}{{end}}";

/// A running toolchain container.
///
/// The resolved reference and container id are fixed once `acquire` returns.
/// The container is stopped by `release` or, failing that, on drop, unless it
/// was acquired with `retain`.
#[derive(Debug)]
pub struct Sandbox {
    backend: ContainerBackend,
    image: String,
    resolved_image: String,
    container_id: String,
    retain: bool,
    released: bool,
}

impl Sandbox {
    /// Pulls `image`, pins it by digest and starts a container that sleeps until
    /// stopped.
    pub fn acquire(backend: ContainerBackend, image: &str, retain: bool) -> Result<Self> {
        let image = image.trim();
        if image.is_empty() {
            return Err(unavailable(image, "container image was not specified"));
        }
        let program = backend.program_str();

        engine(&program, &["pull", image], image, "unable to pull the toolchain container image")?;

        let resolved = engine(
            &program,
            &["inspect", DIGEST_FORMAT, image],
            image,
            "failed to resolve the toolchain container image to a reference by digest",
        )?;
        let resolved_image = resolved.stdout.trim().to_string();
        if resolved_image.is_empty() || !resolved_image.contains('@') {
            return Err(unavailable(
                image,
                &format!("image did not resolve to a digest-qualified reference (got {resolved_image:?})"),
            ));
        }
        tracing::info!(image, resolved = %resolved_image, "resolved toolchain image");

        let created = engine(
            &program,
            &["create", "--rm", resolved_image.as_str(), "sleep", "infinity"],
            image,
            "failed to create a container from the toolchain image",
        )?;
        let container_id = validate_container_id(created.stdout.trim())?;
        tracing::info!(container = %container_id, image = %resolved_image, "created container");

        let mut sandbox = Self {
            backend,
            image: image.to_string(),
            resolved_image,
            container_id,
            retain,
            released: false,
        };
        let started = engine(
            &program,
            &["start", sandbox.container_id.as_str()],
            image,
            "failed to start the toolchain container",
        );
        if let Err(err) = started {
            // `--rm` does not cover a container that never started.
            sandbox.released = true;
            sandbox.remove_created();
            return Err(err);
        }
        Ok(sandbox)
    }

    #[must_use]
    pub fn image(&self) -> &str {
        &self.image
    }

    /// Digest-qualified reference of the image the container runs.
    #[must_use]
    pub fn resolved_image(&self) -> &str {
        &self.resolved_image
    }

    #[must_use]
    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    #[must_use]
    pub fn backend(&self) -> &ContainerBackend {
        &self.backend
    }

    /// Runs `args` inside the container and returns its trimmed combined
    /// output.
    pub fn exec<S: AsRef<str>>(&self, ctx: &ExecContext, args: &[S]) -> Result<String> {
        let output = self.exec_output(ctx, args)?;
        Ok(output.combined().trim().to_string())
    }

    /// Like [`Sandbox::exec`] but returns stdout only, for commands whose
    /// result is parsed while diagnostics go to stderr.
    pub fn exec_stdout<S: AsRef<str>>(&self, ctx: &ExecContext, args: &[S]) -> Result<String> {
        let output = self.exec_output(ctx, args)?;
        Ok(output.stdout.trim().to_string())
    }

    fn exec_output<S: AsRef<str>>(&self, ctx: &ExecContext, args: &[S]) -> Result<RunOutput> {
        let mut full = vec!["exec".to_string()];
        full.extend(ctx.exec_flags());
        full.push(self.container_id.clone());
        full.extend(args.iter().map(|arg| arg.as_ref().to_string()));
        let output = self.engine_run(&full)?;
        if !output.success() {
            return Err(ConfigGenError::CommandFailed {
                context: format!("command inside container {}", short_id(&self.container_id)),
                command: display_command(&self.backend.program_str(), &full),
                code: output.code,
                output: output.combined().trim().to_string(),
            });
        }
        Ok(output)
    }

    /// Copies a host file into the container. Paths inside the container are
    /// absolute; no context applies.
    pub fn copy_in(&self, local: &Path, remote: &str) -> Result<()> {
        let args = vec![
            "cp".to_string(),
            local.display().to_string(),
            format!("{}:{remote}", self.container_id),
        ];
        self.checked(&args, "failed to copy a file into the container")
    }

    pub fn copy_out(&self, remote: &str, local: &Path) -> Result<()> {
        let args = vec![
            "cp".to_string(),
            format!("{}:{remote}", self.container_id),
            local.display().to_string(),
        ];
        self.checked(&args, "failed to copy a file out of the container")
    }

    /// Environment declared in the image config. Changes made by commands run
    /// in the container are not visible here.
    pub fn read_env(&self) -> Result<BTreeMap<String, String>> {
        let args = to_args(&["inspect", "-f", ENV_FORMAT, self.resolved_image.as_str()]);
        let output = self.engine_run(&args)?;
        if !output.success() {
            return Err(self.command_failed(
                "failed to inspect the toolchain image for its environment",
                &args,
                &output,
            ));
        }
        Ok(parse_declared_env(&output.stdout))
    }

    /// Stops the container unless it is retained. Stop failures are logged:
    /// everything worth keeping has been copied out by now.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if self.retain {
            tracing::info!(
                container = %self.container_id,
                image = %self.resolved_image,
                "leaving container running because cleanup is disabled"
            );
            return;
        }
        let args = to_args(&["stop", "-t", "0", self.container_id.as_str()]);
        match self.engine_run(&args) {
            Ok(output) if output.success() => {
                tracing::info!(container = %self.container_id, "stopped container");
            }
            Ok(output) => tracing::warn!(
                container = %self.container_id,
                image = %self.resolved_image,
                output = %output.combined().trim(),
                "failed to stop container; generated configs are unaffected"
            ),
            Err(err) => tracing::warn!(
                container = %self.container_id,
                image = %self.resolved_image,
                error = %err,
                "failed to stop container; generated configs are unaffected"
            ),
        }
    }

    fn remove_created(&self) {
        let args = to_args(&["rm", self.container_id.as_str()]);
        match self.engine_run(&args) {
            Ok(output) if output.success() => {
                tracing::debug!(container = %self.container_id, "removed container that never started");
            }
            Ok(output) => tracing::warn!(
                container = %self.container_id,
                output = %output.combined().trim(),
                "failed to remove container that never started"
            ),
            Err(err) => tracing::warn!(
                container = %self.container_id,
                error = %err,
                "failed to remove container that never started"
            ),
        }
    }

    fn engine_run(&self, args: &[String]) -> Result<RunOutput> {
        run_command(&self.backend.program_str(), args, None)
    }

    fn checked(&self, args: &[String], context: &str) -> Result<()> {
        let output = self.engine_run(args)?;
        if output.success() {
            Ok(())
        } else {
            Err(self.command_failed(context, args, &output))
        }
    }

    fn command_failed(&self, context: &str, args: &[String], output: &RunOutput) -> ConfigGenError {
        ConfigGenError::CommandFailed {
            context: context.to_string(),
            command: display_command(&self.backend.program_str(), args),
            code: output.code,
            output: output.combined().trim().to_string(),
        }
    }
}

impl Drop for Sandbox {
    fn drop(&mut self) {
        self.release_inner();
    }
}

/// Container ids are 64 lowercase hex characters; anything else means the
/// engine printed something we do not understand.
pub(crate) fn validate_container_id(raw: &str) -> Result<String> {
    let id = raw.trim();
    if id.len() == CONTAINER_ID_LEN && id.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
        Ok(id.to_string())
    } else {
        Err(ConfigGenError::ProtocolViolation(format!(
            "container id {id:?} from the create command has unexpected format (length {}, want {CONTAINER_ID_LEN} lowercase hex characters)",
            id.len()
        )))
    }
}

/// Any failure before the container runs, including an engine that cannot be
/// started at all, leaves the sandbox unavailable.
fn engine(program: &str, args: &[&str], image: &str, context: &str) -> Result<RunOutput> {
    let output = run_command(program, &to_args(args), None)
        .map_err(|err| unavailable(image, &format!("{context}: {err}")))?;
    if output.success() {
        Ok(output)
    } else {
        Err(unavailable(
            image,
            &format!("{context}: {}", output.combined().trim()),
        ))
    }
}

fn unavailable(image: &str, reason: &str) -> ConfigGenError {
    ConfigGenError::SandboxUnavailable {
        image: image.to_string(),
        reason: reason.to_string(),
    }
}

fn to_args(args: &[&str]) -> Vec<String> {
    args.iter().map(|arg| (*arg).to_string()).collect()
}

fn short_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}

#[cfg(test)]
mod tests {
    use super::super::backend::BackendKind;
    use super::*;

    #[test]
    fn container_id_must_be_64_lowercase_hex() {
        let good = "0123456789abcdef".repeat(4);
        assert_eq!(validate_container_id(&format!("{good}\n")).expect("valid"), good);

        for bad in [
            "abc".to_string(),
            "0123456789ABCDEF".repeat(4),
            format!("{good}0"),
            "g".repeat(64),
        ] {
            let err = validate_container_id(&bad).expect_err("invalid id");
            assert!(matches!(err, ConfigGenError::ProtocolViolation(_)), "{bad}");
        }
    }

    #[test]
    fn engine_that_cannot_be_spawned_leaves_sandbox_unavailable() {
        let dir = tempfile::tempdir().expect("tempdir");
        let not_executable = dir.path().join("engine");
        std::fs::write(&not_executable, "#!/bin/sh\nexit 0\n").expect("write engine");

        for program in [dir.path().join("missing-engine"), not_executable] {
            let backend = ContainerBackend {
                program: program.clone(),
                kind: BackendKind::Custom,
            };
            let err = Sandbox::acquire(backend, "gcr.io/rbe/toolchain:latest", false)
                .expect_err("engine cannot start");
            match err {
                ConfigGenError::SandboxUnavailable { image, reason } => {
                    assert_eq!(image, "gcr.io/rbe/toolchain:latest");
                    assert!(reason.starts_with("unable to pull"), "{reason}");
                }
                other => panic!("unexpected error for {}: {other}", program.display()),
            }
        }
    }

    #[test]
    fn short_id_truncates() {
        assert_eq!(short_id(&"a".repeat(64)), "aaaaaaaaaaaa");
        assert_eq!(short_id("abc"), "abc");
    }
}
