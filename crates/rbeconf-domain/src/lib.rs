//! Pure data and text for toolchain config generation: options, the error
//! taxonomy, BUILD file rendering, the manifest and parsers for what the
//! toolchain container reports. Nothing here spawns processes or touches the
//! network.

pub mod env;
pub mod error;
pub mod manifest;
pub mod options;
pub mod templates;

pub use env::{parse_declared_env, scan_java_version, scan_property, JAVA_VERSION_PROPERTY};
pub use error::{ConfigGenError, Result};
pub use manifest::{image_digest, ConfigsManifest};
pub use options::{clean_config_path, ExecOs, LauncherDownload, Options, PlatformParams};
pub use templates::{
    cpp_toolchain_target, render_platform_build, GeneratedFile, JavaBuildVariant,
    PlatformBuildParams, CONFIG_BUILD_PATH, JAVA_BUILD_PATH, JAVA_RUNTIME_THRESHOLD,
};
