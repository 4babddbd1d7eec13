//! Lifecycle of the toolchain container the configs are probed from.

mod backend;
mod context;
mod handle;

pub use backend::{detect_container_backend, BackendKind, ContainerBackend, BACKEND_ENV};
pub use context::ExecContext;
pub use handle::Sandbox;
