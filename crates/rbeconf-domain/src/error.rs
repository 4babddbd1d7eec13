use std::io;
use std::path::PathBuf;

use serde_json::{json, Value};

/// Every way a config generation run can fail.
///
/// None of these are retried; the first error aborts the run after the sandbox
/// has been released.
#[derive(thiserror::Error, Debug)]
pub enum ConfigGenError {
    #[error("toolchain container {image} is unavailable: {reason}")]
    SandboxUnavailable { image: String, reason: String },

    #[error("container engine returned malformed data: {0}")]
    ProtocolViolation(String),

    #[error("{context}: `{command}` exited with code {code}")]
    CommandFailed {
        context: String,
        command: String,
        code: i32,
        output: String,
    },

    #[error("`{command}` failed to build the C++ config targets (exit code {code})")]
    BuildFailed {
        command: String,
        code: i32,
        output: String,
    },

    #[error("required configuration missing: {0}")]
    ConfigurationMissing(String),

    #[error("unable to determine the installed {property}: no line looked like `{property} = <version>`")]
    VersionUndetermined { property: String },

    #[error("unable to parse version {version:?} as a semantic version")]
    InvalidVersion {
        version: String,
        #[source]
        source: semver::Error,
    },

    #[error("failed to extract a sha256 digest from image reference {reference:?}")]
    DigestExtractionFailed { reference: String },

    #[error("invalid C++ config bundle {path}: {reason}")]
    InvalidBundle { path: PathBuf, reason: String },

    #[error("invalid options: {}", .0.join("; "))]
    InvalidOptions(Vec<String>),

    #[error("failed to download {url}: {reason}")]
    Download { url: String, reason: String },

    #[error("unable to parse {path} as a JSON string -> string dictionary")]
    EnvJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("{stage}: {source}")]
    Stage {
        stage: &'static str,
        #[source]
        source: Box<ConfigGenError>,
    },
}

impl ConfigGenError {
    /// Builds a `map_err` adapter that attaches `context` to an I/O error.
    pub fn io(context: impl Into<String>) -> impl FnOnce(io::Error) -> Self {
        let context = context.into();
        move |source| Self::Io { context, source }
    }

    /// Tags the error with the pipeline stage it escaped from.
    #[must_use]
    pub fn in_stage(self, stage: &'static str) -> Self {
        Self::Stage {
            stage,
            source: Box::new(self),
        }
    }

    /// The innermost error, with stage tags peeled off.
    #[must_use]
    pub fn root(&self) -> &ConfigGenError {
        match self {
            Self::Stage { source, .. } => source.root(),
            other => other,
        }
    }

    #[must_use]
    pub fn code(&self) -> &'static str {
        match self.root() {
            Self::SandboxUnavailable { .. } => "RBE101",
            Self::ProtocolViolation(_) => "RBE102",
            Self::CommandFailed { .. } => "RBE103",
            Self::BuildFailed { .. } => "RBE104",
            Self::ConfigurationMissing(_) => "RBE105",
            Self::VersionUndetermined { .. } => "RBE106",
            Self::InvalidVersion { .. } => "RBE107",
            Self::DigestExtractionFailed { .. } => "RBE108",
            Self::InvalidBundle { .. } => "RBE109",
            Self::InvalidOptions(_) => "RBE110",
            Self::Download { .. } => "RBE111",
            Self::EnvJson { .. } => "RBE112",
            Self::Io { .. } => "RBE113",
            Self::Stage { .. } => unreachable!("root() never returns a stage wrapper"),
        }
    }

    /// Whether the failure stems from what the caller asked for rather than from
    /// the environment misbehaving.
    #[must_use]
    pub fn is_user_error(&self) -> bool {
        matches!(
            self.root(),
            Self::InvalidOptions(_)
                | Self::ConfigurationMissing(_)
                | Self::InvalidVersion { .. }
                | Self::EnvJson { .. }
        )
    }

    /// Structured diagnostics for the JSON output envelope.
    #[must_use]
    pub fn details(&self) -> Value {
        let mut details = match self.root() {
            Self::SandboxUnavailable { image, reason } => {
                json!({ "image": image, "reason": reason })
            }
            Self::CommandFailed {
                context,
                command,
                code,
                output,
            } => json!({
                "context": context,
                "command": command,
                "exit_code": code,
                "output": output,
            }),
            Self::BuildFailed {
                command,
                code,
                output,
            } => json!({ "command": command, "exit_code": code, "output": output }),
            Self::VersionUndetermined { property } => json!({ "property": property }),
            Self::InvalidVersion { version, .. } => json!({ "version": version }),
            Self::DigestExtractionFailed { reference } => json!({ "reference": reference }),
            Self::InvalidBundle { path, reason } => {
                json!({ "path": path.display().to_string(), "reason": reason })
            }
            Self::InvalidOptions(problems) => json!({ "problems": problems }),
            Self::Download { url, reason } => json!({ "url": url, "reason": reason }),
            Self::EnvJson { path, source } => {
                json!({ "path": path.display().to_string(), "error": source.to_string() })
            }
            Self::Io { context, source } => json!({ "context": context, "error": source.to_string() }),
            _ => json!({}),
        };
        if let Value::Object(ref mut map) = details {
            map.insert("code".into(), Value::String(self.code().to_string()));
            if let Self::Stage { stage, .. } = self {
                map.insert("stage".into(), Value::String((*stage).to_string()));
            }
        }
        details
    }
}

pub type Result<T, E = ConfigGenError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_wrapper_keeps_root_code_and_names_stage() {
        let err = ConfigGenError::VersionUndetermined {
            property: "java.version".into(),
        }
        .in_stage("generate Java configs");

        assert_eq!(err.code(), "RBE106");
        assert!(matches!(
            err.root(),
            ConfigGenError::VersionUndetermined { .. }
        ));
        let details = err.details();
        assert_eq!(details["code"], "RBE106");
        assert_eq!(details["stage"], "generate Java configs");
        assert_eq!(details["property"], "java.version");
        assert!(err.to_string().starts_with("generate Java configs: "));
    }

    #[test]
    fn user_errors_are_classified() {
        assert!(ConfigGenError::InvalidOptions(vec!["x".into()]).is_user_error());
        assert!(ConfigGenError::ConfigurationMissing("JAVA_HOME".into())
            .in_stage("java")
            .is_user_error());
        assert!(!ConfigGenError::ProtocolViolation("short id".into()).is_user_error());
    }

    #[test]
    fn io_adapter_attaches_context() {
        let err = ConfigGenError::io("unable to open /tmp/x")(io::Error::new(
            io::ErrorKind::NotFound,
            "missing",
        ));
        assert_eq!(err.to_string(), "unable to open /tmp/x");
        assert_eq!(err.details()["error"], "missing");
    }
}
