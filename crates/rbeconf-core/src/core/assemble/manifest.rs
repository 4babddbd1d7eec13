use std::fs::{self, File};
use std::io::Read;
use std::path::Path;

use rbeconf_domain::{ConfigGenError, ConfigsManifest, Result};
use sha2::{Digest, Sha256};

/// Hex sha256 of a file's full contents.
pub fn compute_sha256(path: &Path) -> Result<String> {
    let context = || format!("unable to hash {}", path.display());
    let mut file = File::open(path).map_err(ConfigGenError::io(context()))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0_u8; 32 * 1024];
    loop {
        let read = file.read(&mut buf).map_err(ConfigGenError::io(context()))?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

pub fn write_manifest(path: &Path, manifest: &ConfigsManifest) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(ConfigGenError::io(format!("unable to create directory {}", parent.display())))?;
    }
    fs::write(path, manifest.render())
        .map_err(ConfigGenError::io(format!("unable to write manifest {}", path.display())))?;
    tracing::info!(path = %path.display(), "wrote manifest");
    Ok(())
}
