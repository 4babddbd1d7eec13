//! Stages that pull toolchain facts out of a running sandbox.

pub mod cpp;
pub mod java;
pub mod launcher;

pub use cpp::{extract_cpp_configs, generation_env, harden_symlinks, CppRequest};
pub use java::{generate_java_build, probe_java, JavaFacts};
pub use launcher::{install_launcher, LauncherSource};
