#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::assert::Assert;
use serde_json::Value;
use tempfile::TempDir;

pub const CONTAINER_ID: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

pub fn resolved_image() -> String {
    format!("gcr.io/rbe/toolchain@sha256:{}", "c".repeat(64))
}

pub fn parse_json(assert: &Assert) -> Value {
    serde_json::from_slice(&assert.get_output().stdout).expect("valid json")
}

/// A scratch area with a fake container engine that runs `exec` on the host
/// and a fake JDK whose `java` prints a properties dump.
pub struct FakeToolchain {
    pub root: TempDir,
    pub engine: PathBuf,
    pub log: PathBuf,
    pub java_home: PathBuf,
}

const ENGINE: &str = r#"#!/bin/sh
printf '%s\n' "$*" >> '@LOG@'
cmd="$1"
shift
case "$cmd" in
  pull|start|stop) ;;
  inspect)
    if [ "$1" = "-f" ]; then
      printf 'PATH=/usr/bin:/bin\nJAVA_HOME=%s\n' '@JAVA_HOME@'
    else
      printf '%s\n' '@RESOLVED@'
    fi
    ;;
  create) printf '%s\n' '@ID@' ;;
  exec)
    while [ $# -gt 0 ]; do
      case "$1" in
        -w) cd "$2" || exit 125; shift 2 ;;
        -e) export "$2"; shift 2 ;;
        *) break ;;
      esac
    done
    shift
    exec "$@"
    ;;
  *) exit 64 ;;
esac
"#;

const JAVA: &str = r#"#!/bin/sh
echo 'Property settings:' >&2
echo '    java.version = 1.8.0_292' >&2
echo 'openjdk version "1.8.0_292"' >&2
"#;

impl FakeToolchain {
    pub fn new() -> Self {
        let root = tempfile::tempdir().expect("tempdir");
        let log = root.path().join("engine.log");
        let java_home = root.path().join("jdk");
        let engine = root.path().join("fake-engine");
        write_script(
            &engine,
            &ENGINE
                .replace("@LOG@", &log.display().to_string())
                .replace("@JAVA_HOME@", &java_home.display().to_string())
                .replace("@RESOLVED@", &resolved_image())
                .replace("@ID@", CONTAINER_ID),
        );
        fs::create_dir_all(java_home.join("bin")).expect("jdk bin");
        write_script(&java_home.join("bin").join("java"), JAVA);
        Self {
            root,
            engine,
            log,
            java_home,
        }
    }

    pub fn path(&self) -> &Path {
        self.root.path()
    }

    /// Workdir inside the "container"; its parent exists, it does not.
    pub fn sandbox_workdir(&self) -> PathBuf {
        let parent = self.path().join("sandbox");
        fs::create_dir_all(&parent).expect("sandbox parent");
        parent.join("workdir")
    }

    pub fn calls(&self) -> Vec<String> {
        fs::read_to_string(&self.log)
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }
}

fn write_script(path: &Path, body: &str) {
    fs::write(path, body).expect("write script");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).expect("chmod script");
    }
}
