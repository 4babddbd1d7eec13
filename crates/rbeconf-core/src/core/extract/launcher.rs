use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use rbeconf_domain::{ConfigGenError, LauncherDownload, Result};

use crate::core::sandbox::{ExecContext, Sandbox};

const USER_AGENT: &str = concat!("rbeconf/", env!("CARGO_PKG_VERSION"));
const HTTP_TIMEOUT: Duration = Duration::from_secs(300);

/// Where the launcher binary comes from.
#[derive(Clone, Debug)]
pub enum LauncherSource<'a> {
    /// A binary already on the host.
    Local(&'a Path),
    Download(LauncherDownload),
}

/// Puts the build launcher into the sandbox workdir and marks it executable.
/// Returns the launcher's path inside the sandbox.
pub fn install_launcher(
    sandbox: &Sandbox,
    ctx: &ExecContext,
    source: &LauncherSource<'_>,
    file_name: &str,
    local_dir: &Path,
) -> Result<String> {
    let local = match source {
        LauncherSource::Local(path) => {
            tracing::info!(path = %path.display(), "using local launcher binary");
            path.to_path_buf()
        }
        LauncherSource::Download(download) => fetch(download, local_dir)?,
    };

    let workdir = ctx.workdir().unwrap_or_default();
    let remote = join_remote(workdir, file_name);
    sandbox.copy_in(&local, &remote)?;
    sandbox.exec(ctx, &["chmod", "+x", remote.as_str()])?;
    tracing::info!(path = %remote, "installed launcher into the container");
    Ok(remote)
}

/// Joins sandbox paths with `/`, which every supported engine accepts.
pub(crate) fn join_remote(dir: &str, name: &str) -> String {
    let dir = dir.trim_end_matches('/');
    if dir.is_empty() {
        format!("/{name}")
    } else {
        format!("{dir}/{name}")
    }
}

fn http_client() -> Result<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|err| ConfigGenError::Download {
            url: String::new(),
            reason: format!("failed to build http client: {err}"),
        })
}

fn fetch(download: &LauncherDownload, local_dir: &Path) -> Result<PathBuf> {
    let download_error = |reason: String| ConfigGenError::Download {
        url: download.url.to_string(),
        reason,
    };
    tracing::info!(url = download.url, "downloading launcher");
    let client = http_client()?;
    let mut response = client
        .get(download.url)
        .send()
        .map_err(|err| download_error(err.to_string()))?
        .error_for_status()
        .map_err(|err| download_error(err.to_string()))?;

    let dest = local_dir.join(download.file_name);
    let mut tmp = tempfile::NamedTempFile::new_in(local_dir)
        .map_err(ConfigGenError::io(format!("unable to create a file in {}", local_dir.display())))?;
    io::copy(&mut response, &mut tmp).map_err(|err| download_error(err.to_string()))?;
    tmp.flush()
        .map_err(ConfigGenError::io(format!("unable to write {}", dest.display())))?;
    tmp.persist(&dest).map_err(|err| ConfigGenError::Io {
        context: format!("unable to persist {}", dest.display()),
        source: err.error,
    })?;
    #[cfg(unix)]
    {
        use std::fs;
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&dest, fs::Permissions::from_mode(0o755))
            .map_err(ConfigGenError::io(format!("unable to mark {} executable", dest.display())))?;
    }
    tracing::info!(path = %dest.display(), "downloaded launcher");
    Ok(dest)
}
