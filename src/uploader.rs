//! Recursive upload of a local directory into the current remote directory

use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;

use crate::eraser::remote_join;
use crate::error::{Result, SessionError};
use crate::logger::Logger;
use crate::session::{DepthBudget, Descent, RemoteSession};

/// Statistics for one upload pass
#[derive(Debug, Default, Clone)]
pub struct UploadStats {
    pub files_uploaded: u64,
    pub bytes_uploaded: u64,
    pub dirs_created: u64,
    pub errors: Vec<String>,
}

impl UploadStats {
    pub fn add_file(&mut self, bytes: u64) {
        self.files_uploaded += 1;
        self.bytes_uploaded += bytes;
    }

    pub fn add_error(&mut self, error: String) {
        self.errors.push(error);
    }
}

/// Stream one local file to `name` in the current remote directory.
pub fn upload_file<S: RemoteSession + ?Sized>(session: &mut S, local: &Path, name: &str) -> Result<u64> {
    let file = File::open(local).map_err(|source| SessionError::Local {
        path: local.to_path_buf(),
        source,
    })?;
    let mut reader = BufReader::with_capacity(256 * 1024, file);
    session.store(name, &mut reader)
}

fn record(stats: &mut UploadStats, log: &dyn Logger, target: &str, e: &SessionError) {
    tracing::warn!("Failed to upload {}: {}", target, e);
    log.error("upload", target, &e.to_string());
    stats.add_error(format!("{}: {}", target, e));
}

fn upload_subdir<S: RemoteSession + ?Sized>(
    session: &mut S,
    local: &Path,
    name: &str,
    remote: &str,
    depth: DepthBudget,
    stats: &mut UploadStats,
    log: &dyn Logger,
) -> Result<()> {
    let depth = depth.descend()?;
    tracing::info!("Creating remote directory {}", remote);
    match session.make_directory(name) {
        Ok(()) => {
            stats.dirs_created += 1;
            log.make_dir(remote);
        }
        Err(e) if e.is_fatal() => return Err(e),
        // Most likely it already exists; entering it below settles that
        Err(e) => tracing::debug!(%remote, error = %e, "MKD refused"),
    }
    let mut dir = Descent::enter(session, name)?;
    match upload_tree(&mut *dir, local, remote, depth, stats, log) {
        Err(e) if e.is_fatal() => Err(e),
        // Ascend before reporting, so a failed CWD .. surfaces as CursorLost
        inner => {
            dir.leave()?;
            inner
        }
    }
}

/// Upload the contents of `local` into the current remote directory, which is `remote`.
///
/// Subdirectories are created as needed ("already exists" is fine). Remote
/// files with no local counterpart are left alone. A failure on one entry is
/// logged, recorded in `stats.errors` and skipped; only session-fatal errors
/// and an unreadable `local` itself are returned. The cursor is back in the
/// starting directory when this returns.
pub fn upload_tree<S: RemoteSession + ?Sized>(
    session: &mut S,
    local: &Path,
    remote: &str,
    depth: DepthBudget,
    stats: &mut UploadStats,
    log: &dyn Logger,
) -> Result<()> {
    let local_err = |source| SessionError::Local {
        path: local.to_path_buf(),
        source,
    };
    let mut entries = fs::read_dir(local)
        .map_err(local_err)?
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(local_err)?;
    // read_dir order is unspecified; sort so runs and logs are reproducible
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            let e = SessionError::Encoding(file_name.to_string_lossy().into_owned());
            record(stats, log, &path.display().to_string(), &e);
            continue;
        };
        let target = remote_join(remote, name);

        // Follows symlinks; the depth budget bounds any cycle
        let meta = match fs::metadata(&path) {
            Ok(meta) => meta,
            Err(source) => {
                record(stats, log, &target, &SessionError::Local { path, source });
                continue;
            }
        };

        let result = if meta.is_file() {
            tracing::info!("Uploading {}", target);
            upload_file(session, &path, name).map(|bytes| {
                stats.add_file(bytes);
                log.store_done(&path, &target, bytes);
            })
        } else if meta.is_dir() {
            upload_subdir(session, &path, name, &target, depth, stats, log)
        } else {
            tracing::warn!("Skipping {}: not a regular file or directory", path.display());
            Ok(())
        };

        if let Err(e) = result {
            if e.is_fatal() {
                return Err(e);
            }
            record(stats, log, &target, &e);
        }
    }
    Ok(())
}
