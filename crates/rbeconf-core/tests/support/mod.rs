#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use rbeconf_core::domain::{ExecOs, Options};
use tempfile::TempDir;

pub const CONTAINER_ID: &str = "4f3c2b1a09f8e7d6c5b4a3928170f6e5d4c3b2a19080f7e6d5c4b3a291807f6e";
pub const JAVA_VERSION: &str = "11.0.14";

pub fn digest() -> String {
    "ab".repeat(32)
}

pub fn resolved_image() -> String {
    format!("gcr.io/rbe/toolchain@sha256:{}", digest())
}

/// Knobs for the fake engine and the fake tools it runs.
pub struct FakeConfig {
    pub container_id: String,
    pub resolved: String,
    pub declare_java_home: bool,
    pub build_exit: i32,
    pub start_exit: i32,
}

impl Default for FakeConfig {
    fn default() -> Self {
        Self {
            container_id: CONTAINER_ID.to_string(),
            resolved: resolved_image(),
            declare_java_home: true,
            build_exit: 0,
            start_exit: 0,
        }
    }
}

/// A container engine stand-in: a shell script that records its arguments and
/// runs `exec` requests directly on the host.
pub struct FakeEngine {
    pub root: TempDir,
    pub engine: PathBuf,
    pub launcher: PathBuf,
    pub log: PathBuf,
    pub workdir: PathBuf,
    pub output_base: PathBuf,
    pub java_home: PathBuf,
    pub config: FakeConfig,
}

const ENGINE: &str = r#"#!/bin/sh
printf '%s\n' "$*" >> '@LOG@'
id='@ID@'
cmd="$1"
shift
case "$cmd" in
  pull|stop|rm)
    exit 0
    ;;
  start)
    if [ @START_EXIT@ -ne 0 ]; then
      echo "cannot start container $1: no such runtime" >&2
      exit @START_EXIT@
    fi
    ;;
  inspect)
    if [ "$1" = "-f" ]; then
      printf 'PATH=/usr/local/bin:/usr/bin:/bin\n'
      @JAVA_HOME_LINE@
      printf 'LANG=C.UTF-8\n'
    else
      printf '%s\n' '@RESOLVED@'
    fi
    ;;
  create)
    printf '%s\n' "$id"
    ;;
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
  cp)
    src="${1#"$id":}"
    dst="${2#"$id":}"
    exec cp "$src" "$dst"
    ;;
  *)
    echo "unexpected engine command: $cmd" >&2
    exit 64
    ;;
esac
"#;

const LAUNCHER: &str = r#"#!/bin/sh
base='@OUTPUT_BASE@'
case "$1" in
  build)
    [ "$USE_BAZEL_VERSION" = "4.2.0" ] || { echo "unexpected bazel version: $USE_BAZEL_VERSION" >&2; exit 3; }
    [ -f WORKSPACE ] || { echo "not inside a workspace" >&2; exit 4; }
    if [ @BUILD_EXIT@ -ne 0 ]; then
      echo "ERROR: toolchain detection failed" >&2
      exit @BUILD_EXIT@
    fi
    repo="$base/external/local_config_cc"
    mkdir -p "$repo/tools"
    printf 'cc_toolchain_suite(name = "toolchain")\n' > "$repo/BUILD"
    printf 'workspace(name = "local_config_cc")\n' > "$repo/WORKSPACE"
    printf '#!/bin/sh\nexec /usr/bin/gcc "$@"\n' > "$repo/tools/cc_wrapper.sh"
    ln -s cc_wrapper.sh "$repo/tools/wrapper_link"
    ln -s wrapper_link "$repo/tools/wrapper_chain"
    printf '%s %s\n' "$RBECONF_TEST_INLINE" "$RBECONF_TEST_JSON" > "$repo/gen_env.txt"
    ;;
  info)
    [ "$2" = "output_base" ] || exit 5
    [ -z "$RBECONF_TEST_INLINE" ] || { echo "generation env leaked into info" >&2; exit 6; }
    printf '%s\n' "$base"
    echo "INFO: Invocation ID: 5f1d3c2a-0b7e-4c1d-9a6f-2e8b7c4d1a09" >&2
    ;;
  *)
    exit 2
    ;;
esac
"#;

const JAVA: &str = r#"#!/bin/sh
cat >&2 <<'EOF'
Property settings:
    file.separator = /
    java.home = @JAVA_HOME@
    java.version = 11.0.14
    java.version.date = 2022-01-18
    os.name = Linux

openjdk version "11.0.14" 2022-01-18
EOF
"#;

impl FakeEngine {
    pub fn new() -> Self {
        Self::with_config(FakeConfig::default())
    }

    pub fn with_config(config: FakeConfig) -> Self {
        let root = tempfile::tempdir().expect("tempdir");
        let base = root.path();
        let log = base.join("engine.log");
        let output_base = base.join("output_base");
        let java_home = base.join("jdk");
        let sandbox_root = base.join("sandbox");
        fs::create_dir_all(&sandbox_root).expect("sandbox root");
        let workdir = sandbox_root.join("workdir");

        let java_home_line = if config.declare_java_home {
            format!("printf 'JAVA_HOME=%s\\n' '{}'", java_home.display())
        } else {
            ":".to_string()
        };
        let engine = base.join("fake-engine");
        write_script(
            &engine,
            &ENGINE
                .replace("@LOG@", &log.display().to_string())
                .replace("@ID@", &config.container_id)
                .replace("@RESOLVED@", &config.resolved)
                .replace("@START_EXIT@", &config.start_exit.to_string())
                .replace("@JAVA_HOME_LINE@", &java_home_line),
        );

        let launcher = base.join("bazelisk-host");
        write_script(
            &launcher,
            &LAUNCHER
                .replace("@OUTPUT_BASE@", &output_base.display().to_string())
                .replace("@BUILD_EXIT@", &config.build_exit.to_string()),
        );

        let java = java_home.join("bin").join("java");
        fs::create_dir_all(java.parent().expect("bin dir")).expect("jdk bin");
        write_script(&java, &JAVA.replace("@JAVA_HOME@", &java_home.display().to_string()));

        Self {
            root,
            engine,
            launcher,
            log,
            workdir,
            output_base,
            java_home,
            config,
        }
    }

    pub fn path(&self) -> &Path {
        self.root.path()
    }

    /// Linux options wired to this fake engine, writing nothing yet.
    pub fn options(&self) -> Options {
        let mut opts = Options::with_defaults(ExecOs::Linux, ExecOs::Linux);
        opts.bazel_version = "4.2.0".to_string();
        opts.toolchain_container = "gcr.io/rbe/toolchain:latest".to_string();
        opts.container_backend = Some(self.engine.display().to_string());
        opts.launcher_path = Some(self.launcher.clone());
        opts.sandbox_workdir = Some(self.workdir.display().to_string());
        opts
    }

    /// Every engine invocation so far, one argument string per call.
    pub fn calls(&self) -> Vec<String> {
        fs::read_to_string(&self.log)
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    pub fn stop_call(&self) -> String {
        format!("stop -t 0 {}", self.config.container_id)
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

/// Every regular file below `root`, relative and sorted.
pub fn files_under(root: &Path) -> Vec<String> {
    fn walk(dir: &Path, root: &Path, out: &mut Vec<String>) {
        for entry in fs::read_dir(dir).expect("read dir") {
            let path = entry.expect("dir entry").path();
            if path.is_dir() {
                walk(&path, root, out);
            } else {
                let rel = path.strip_prefix(root).expect("under root");
                out.push(rel.to_string_lossy().replace('\\', "/"));
            }
        }
    }
    let mut out = Vec::new();
    walk(root, root, &mut out);
    out.sort();
    out
}
