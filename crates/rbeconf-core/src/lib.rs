mod core;
mod pipeline;

pub use crate::core::assemble::{
    compute_sha256, write_config_dir, write_config_tarball, write_manifest, TarballOutput,
    CC_PREFIX,
};
pub use crate::core::extract::{
    extract_cpp_configs, generate_java_build, generation_env, harden_symlinks, install_launcher,
    probe_java, CppRequest, JavaFacts, LauncherSource,
};
pub use crate::core::outcome::{CommandStatus, ExecutionOutcome};
pub use crate::core::process::{run_command, RunOutput};
pub use crate::core::sandbox::{
    detect_container_backend, BackendKind, ContainerBackend, ExecContext, Sandbox, BACKEND_ENV,
};
pub use crate::pipeline::{generate, GenerationSummary};

pub use rbeconf_domain as domain;
