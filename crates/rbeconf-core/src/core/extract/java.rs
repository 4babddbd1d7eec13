use rbeconf_domain::{scan_java_version, ConfigGenError, GeneratedFile, JavaBuildVariant, Result};

use super::launcher::join_remote;
use crate::core::sandbox::{ExecContext, Sandbox};

pub const JAVA_HOME_ENV: &str = "JAVA_HOME";

/// Facts probed from the JDK installed in the toolchain image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JavaFacts {
    pub java_home: String,
    pub java_version: String,
}

/// Reads `JAVA_HOME` from the image config and asks that JDK for its version.
pub fn probe_java(sandbox: &Sandbox, ctx: &ExecContext) -> Result<JavaFacts> {
    let env = sandbox.read_env()?;
    let java_home = match env.get(JAVA_HOME_ENV) {
        Some(home) if !home.is_empty() => home.clone(),
        Some(_) => {
            return Err(ConfigGenError::ConfigurationMissing(format!(
                "{JAVA_HOME_ENV} is blank in the toolchain image"
            )))
        }
        None => {
            return Err(ConfigGenError::ConfigurationMissing(format!(
                "toolchain image does not declare {JAVA_HOME_ENV}"
            )))
        }
    };
    tracing::info!(java_home = %java_home, "found JAVA_HOME");

    let java = join_remote(&java_home, "bin/java");
    // The properties dump is the deterministic part; `-version` keeps the
    // launcher from complaining about a missing main class.
    let output = sandbox.exec(ctx, &[java.as_str(), "-XshowSettings:properties", "-version"])?;
    let java_version = scan_java_version(&output)?;
    tracing::info!(version = %java_version, "found Java version");
    Ok(JavaFacts {
        java_home,
        java_version,
    })
}

/// Probes the JDK and renders `java/BUILD` in the layout `bazel_version`
/// expects.
pub fn generate_java_build(
    sandbox: &Sandbox,
    ctx: &ExecContext,
    bazel_version: &str,
) -> Result<GeneratedFile> {
    let facts = probe_java(sandbox, ctx)?;
    let variant = JavaBuildVariant::select(bazel_version)?;
    tracing::debug!(?variant, bazel_version, "selected Java BUILD layout");
    Ok(variant.render(&facts.java_home, &facts.java_version))
}
