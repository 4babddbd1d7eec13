//! Turns the C++ bundle and generated BUILD files into the requested outputs.
//!
//! Both outputs read the same inputs independently: bundle files land under
//! `cc/`, generated files at their logical paths.

mod directory;
mod manifest;
mod tarball;

use std::path::{Component, Path, PathBuf};

pub use directory::write_config_dir;
pub use manifest::{compute_sha256, write_manifest};
pub use tarball::{write_config_tarball, TarballOutput};

pub const CC_PREFIX: &str = "cc";
/// Mode of generated files in both outputs.
const GENERATED_MODE: u32 = 0o777;
/// Mode of the finished archive.
const TARBALL_MODE: u32 = 0o644;
const WORKSPACE_MARKER: &str = "WORKSPACE";

/// Bundle entry path with `.` segments dropped. `None` for paths that are
/// empty or try to leave the bundle root.
fn normalize_entry_path(raw: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in raw.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if out.as_os_str().is_empty() {
        None
    } else {
        Some(out)
    }
}

fn is_workspace_marker(path: &Path) -> bool {
    path.file_name().and_then(|name| name.to_str()) == Some(WORKSPACE_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_paths_are_normalized() {
        assert_eq!(
            normalize_entry_path(Path::new("./tools/cpp/BUILD")),
            Some(PathBuf::from("tools/cpp/BUILD"))
        );
        assert_eq!(normalize_entry_path(Path::new("./")), None);
        assert_eq!(normalize_entry_path(Path::new("../etc/passwd")), None);
        assert_eq!(normalize_entry_path(Path::new("/abs")), None);
    }

    #[test]
    fn workspace_marker_matches_file_name_only() {
        assert!(is_workspace_marker(Path::new("WORKSPACE")));
        assert!(is_workspace_marker(Path::new("nested/WORKSPACE")));
        assert!(!is_workspace_marker(Path::new("WORKSPACE.bazel")));
        assert!(!is_workspace_marker(Path::new("MY_WORKSPACE")));
    }
}
