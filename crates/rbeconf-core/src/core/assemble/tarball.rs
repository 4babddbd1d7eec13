use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use rbeconf_domain::{ConfigGenError, GeneratedFile, Result};
use sha2::{Digest, Sha256};
use tar::{Archive, Builder, EntryType, Header};
use tempfile::NamedTempFile;

use super::{is_workspace_marker, normalize_entry_path, CC_PREFIX, GENERATED_MODE};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TarballOutput {
    pub path: PathBuf,
    /// Hex sha256 of the finished archive.
    pub sha256: String,
    pub size: u64,
}

/// Writes the merged config archive to `dest`.
///
/// Entry order is fixed (bundle entries as they appear in the bundle, then the
/// generated files in the order given) and every timestamp is zero, so equal
/// inputs produce equal bytes. `dest` only appears once the archive is
/// complete.
pub fn write_config_tarball(
    dest: &Path,
    bundle: Option<&Path>,
    generated: &[GeneratedFile],
) -> Result<TarballOutput> {
    let parent = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)
        .map_err(ConfigGenError::io(format!("unable to create directory {}", parent.display())))?;
    let tmp = NamedTempFile::new_in(&parent)
        .map_err(ConfigGenError::io(format!("unable to create a file in {}", parent.display())))?;
    let mut builder = Builder::new(HashingWriter::new(tmp));

    if let Some(bundle) = bundle {
        copy_bundle_entries(&mut builder, bundle)?;
    }
    for file in generated {
        append_generated(&mut builder, file)?;
    }

    let writer = builder
        .into_inner()
        .map_err(ConfigGenError::io(format!("failed to finish writing {}", dest.display())))?;
    let HashingWriter {
        inner: mut tmp,
        hasher,
        bytes_written: size,
    } = writer;
    tmp.flush()
        .map_err(ConfigGenError::io(format!("failed to flush {}", dest.display())))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        // Temp files are created owner-only.
        tmp.as_file()
            .set_permissions(fs::Permissions::from_mode(super::TARBALL_MODE))
            .map_err(ConfigGenError::io(format!("failed to set mode of {}", dest.display())))?;
    }
    tmp.persist(dest).map_err(|err| ConfigGenError::Io {
        context: format!("unable to write output tarball {}", dest.display()),
        source: err.error,
    })?;
    let sha256 = hex::encode(hasher.finalize());
    tracing::info!(path = %dest.display(), sha256 = %sha256, "wrote config tarball");
    Ok(TarballOutput {
        path: dest.to_path_buf(),
        sha256,
        size,
    })
}

fn copy_bundle_entries(builder: &mut Builder<impl Write>, bundle: &Path) -> Result<()> {
    let read_error = || ConfigGenError::io(format!("error while reading C++ bundle {}", bundle.display()));
    let file = File::open(bundle)
        .map_err(ConfigGenError::io(format!("unable to open C++ bundle {}", bundle.display())))?;
    let mut archive = Archive::new(file);
    for entry in archive.entries().map_err(read_error())? {
        let mut entry = entry.map_err(read_error())?;
        let entry_type = entry.header().entry_type();
        match entry_type {
            EntryType::Directory | EntryType::XGlobalHeader => continue,
            EntryType::Regular | EntryType::Continuous => {}
            other => {
                let name = entry.path().map(|p| p.display().to_string()).unwrap_or_default();
                return Err(invalid(
                    bundle,
                    format!("unexpected entry {name:?} of type {other:?}"),
                ));
            }
        }
        let raw = entry.path().map_err(read_error())?.into_owned();
        let Some(rel) = normalize_entry_path(&raw) else {
            return Err(invalid(
                bundle,
                format!("entry {:?} escapes the bundle root", raw.display().to_string()),
            ));
        };
        if is_workspace_marker(&rel) {
            continue;
        }
        let mut header = entry.header().clone();
        header.set_mtime(0);
        let out_path = Path::new(CC_PREFIX).join(&rel);
        builder
            .append_data(&mut header, &out_path, &mut entry)
            .map_err(ConfigGenError::io(format!(
                "failed to copy {} into the output tarball",
                out_path.display()
            )))?;
    }
    Ok(())
}

fn append_generated(builder: &mut Builder<impl Write>, file: &GeneratedFile) -> Result<()> {
    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Regular);
    header.set_size(file.contents.len() as u64);
    header.set_mode(GENERATED_MODE);
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    builder
        .append_data(&mut header, &file.path, file.contents.as_slice())
        .map_err(ConfigGenError::io(format!(
            "failed to write {} into the output tarball",
            file.path
        )))
}

fn invalid(bundle: &Path, reason: String) -> ConfigGenError {
    ConfigGenError::InvalidBundle {
        path: bundle.to_path_buf(),
        reason,
    }
}

struct HashingWriter<W> {
    inner: W,
    hasher: Sha256,
    bytes_written: u64,
}

impl<W> HashingWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            bytes_written: 0,
        }
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.hasher.update(&buf[..written]);
        self.bytes_written = self.bytes_written.saturating_add(written as u64);
        Ok(written)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}
