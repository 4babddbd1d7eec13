use std::path::PathBuf;

use rbeconf_domain::{ConfigGenError, Result};

pub const BACKEND_ENV: &str = "RBECONF_CONTAINER_BACKEND";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BackendKind {
    Docker,
    Podman,
    Custom,
}

/// The container engine CLI every sandbox command is dispatched through.
#[derive(Clone, Debug)]
pub struct ContainerBackend {
    pub program: PathBuf,
    pub kind: BackendKind,
}

impl ContainerBackend {
    #[must_use]
    pub fn program_str(&self) -> String {
        self.program.to_string_lossy().to_string()
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self.kind {
            BackendKind::Docker => "docker",
            BackendKind::Podman => "podman",
            BackendKind::Custom => "custom",
        }
    }
}

/// Picks the container engine: an explicit override (argument first, then
/// `RBECONF_CONTAINER_BACKEND`), else `docker` or `podman` found on `PATH`.
pub fn detect_container_backend(override_program: Option<&str>) -> Result<ContainerBackend> {
    let requested = override_program
        .map(str::to_string)
        .or_else(|| std::env::var(BACKEND_ENV).ok())
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty());
    if let Some(raw) = requested {
        if raw.eq_ignore_ascii_case("docker") {
            return Ok(ContainerBackend {
                program: resolve_program("docker")?,
                kind: BackendKind::Docker,
            });
        }
        if raw.eq_ignore_ascii_case("podman") {
            return Ok(ContainerBackend {
                program: resolve_program("podman")?,
                kind: BackendKind::Podman,
            });
        }
        return Ok(ContainerBackend {
            program: resolve_program(&raw)?,
            kind: BackendKind::Custom,
        });
    }

    for (name, kind) in [
        ("docker", BackendKind::Docker),
        ("podman", BackendKind::Podman),
    ] {
        if let Ok(program) = resolve_program(name) {
            return Ok(ContainerBackend { program, kind });
        }
    }

    Err(ConfigGenError::SandboxUnavailable {
        image: String::new(),
        reason: format!(
            "no container engine found; install docker or podman, or set {BACKEND_ENV} to a compatible binary"
        ),
    })
}

fn resolve_program(name: &str) -> Result<PathBuf> {
    let candidate = if name.contains(std::path::MAIN_SEPARATOR) || name.contains('/') {
        PathBuf::from(name)
    } else {
        which::which(name).unwrap_or_else(|_| PathBuf::from(name))
    };
    if candidate.exists() {
        return Ok(candidate);
    }
    Err(ConfigGenError::SandboxUnavailable {
        image: String::new(),
        reason: format!("container engine '{name}' was not found"),
    })
}
