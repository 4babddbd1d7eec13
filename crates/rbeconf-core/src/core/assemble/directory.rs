use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use rbeconf_domain::{ConfigGenError, GeneratedFile, Result};
use tar::Archive;

use super::{is_workspace_marker, normalize_entry_path, CC_PREFIX, GENERATED_MODE};

/// Writes the configs as a directory tree rooted at `root`: the bundle's
/// regular files under `cc/` and every generated file at its logical path.
/// Returns the files written, relative to `root`.
pub fn write_config_dir(
    root: &Path,
    bundle: Option<&Path>,
    generated: &[GeneratedFile],
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(root)
        .map_err(ConfigGenError::io(format!("unable to create directory {}", root.display())))?;
    let mut written = Vec::new();
    if let Some(bundle) = bundle {
        extract_bundle(root, bundle, &mut written)?;
    }
    for file in generated {
        let rel = PathBuf::from(&file.path);
        write_file(&root.join(&rel), &file.contents)?;
        written.push(rel);
    }
    tracing::info!(dir = %root.display(), files = written.len(), "copied generated configs");
    Ok(written)
}

fn extract_bundle(root: &Path, bundle: &Path, written: &mut Vec<PathBuf>) -> Result<()> {
    let read_error = || ConfigGenError::io(format!("error while reading C++ bundle {}", bundle.display()));
    let file = File::open(bundle)
        .map_err(ConfigGenError::io(format!("unable to open C++ bundle {}", bundle.display())))?;
    let mut archive = Archive::new(file);
    for entry in archive.entries().map_err(read_error())? {
        let mut entry = entry.map_err(read_error())?;
        // Directories and links never make it into the tree; parents are
        // created on demand.
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let raw = entry.path().map_err(read_error())?.into_owned();
        let Some(rel) = normalize_entry_path(&raw) else {
            return Err(ConfigGenError::InvalidBundle {
                path: bundle.to_path_buf(),
                reason: format!("entry {:?} escapes the bundle root", raw.display().to_string()),
            });
        };
        if is_workspace_marker(&rel) {
            continue;
        }
        let rel = Path::new(CC_PREFIX).join(rel);
        let dest = root.join(&rel);
        create_parent(&dest)?;
        let mut out = File::create(&dest)
            .map_err(ConfigGenError::io(format!("failed to create {}", dest.display())))?;
        io::copy(&mut entry, &mut out).map_err(ConfigGenError::io(format!(
            "error while extracting {} to {}",
            raw.display(),
            dest.display()
        )))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(mode) = entry.header().mode() {
                fs::set_permissions(&dest, fs::Permissions::from_mode(mode & 0o777))
                    .map_err(ConfigGenError::io(format!("failed to set mode of {}", dest.display())))?;
            }
        }
        written.push(rel);
    }
    Ok(())
}

fn write_file(dest: &Path, contents: &[u8]) -> Result<()> {
    create_parent(dest)?;
    fs::write(dest, contents).map_err(ConfigGenError::io(format!("unable to write file {}", dest.display())))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dest, fs::Permissions::from_mode(GENERATED_MODE))
            .map_err(ConfigGenError::io(format!("failed to set mode of {}", dest.display())))?;
    }
    Ok(())
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(ConfigGenError::io(format!("unable to create directory {}", parent.display())))?;
    }
    Ok(())
}
