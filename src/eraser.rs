//! Recursive removal of remote trees
//!
//! NLST gives no entry types, so every entry is first tried as a file
//! (`DELE`); a refusal is taken to mean "directory", which is then emptied
//! recursively and removed with `RMD`. A protected file therefore looks like
//! a directory and ends up reported as "could not delete" once the `CWD` into
//! it fails.

use crate::error::{Result, SessionError};
use crate::logger::Logger;
use crate::session::{DepthBudget, Descent, RemoteSession};

/// Counters for one cleanup pass
#[derive(Debug, Default, Clone)]
pub struct CleanStats {
    pub files_deleted: u64,
    pub dirs_removed: u64,
    pub failures: Vec<String>,
}

impl CleanStats {
    fn add_failure(&mut self, target: &str, e: &SessionError) {
        self.failures.push(format!("{}: {}", target, e));
    }
}

pub(crate) fn remote_join(parent: &str, name: &str) -> String {
    if parent.ends_with('/') {
        format!("{}{}", parent, name)
    } else {
        format!("{}/{}", parent, name)
    }
}

fn is_pseudo(name: &str) -> bool {
    name == "." || name == ".."
}

/// Delete `name` (a file, or a directory after emptying it).
fn remove_entry<S: RemoteSession + ?Sized>(
    session: &mut S,
    parent: &str,
    name: &str,
    depth: DepthBudget,
    stats: &mut CleanStats,
    log: &dyn Logger,
) -> Result<()> {
    let path = remote_join(parent, name);
    match session.delete(name) {
        Ok(()) => {
            tracing::info!("Deleted file: {}", path);
            stats.files_deleted += 1;
            log.delete(&path);
            return Ok(());
        }
        Err(e) if e.is_fatal() => return Err(e),
        Err(e) => tracing::debug!(%path, error = %e, "DELE refused, treating as directory"),
    }

    erase_tree(session, parent, name, depth.descend()?, stats, log)?;
    session.remove_directory(name)?;
    tracing::info!("Deleted directory: {}", path);
    stats.dirs_removed += 1;
    log.remove_dir(&path);
    Ok(())
}

fn remove_entries<S: RemoteSession + ?Sized>(
    session: &mut S,
    parent: &str,
    entries: &[String],
    depth: DepthBudget,
    stats: &mut CleanStats,
    log: &dyn Logger,
) -> Result<()> {
    for name in entries.iter().filter(|n| !is_pseudo(n)) {
        if let Err(e) = remove_entry(session, parent, name, depth, stats, log) {
            if e.is_fatal() {
                return Err(e);
            }
            let path = remote_join(parent, name);
            tracing::warn!("Could not delete {}: {}", path, e);
            log.error("clean", &path, &e.to_string());
            stats.add_failure(&path, &e);
        }
    }
    Ok(())
}

/// Empty the directory `name` below the current remote directory.
///
/// `name` itself is left in place (empty) for the caller to remove. Failing
/// to enter `name` is returned; failures on individual entries inside are
/// logged, counted and skipped. A listing failure counts as "no entries".
/// The cursor is back in the starting directory when this returns, on every
/// path.
pub fn erase_tree<S: RemoteSession + ?Sized>(
    session: &mut S,
    parent: &str,
    name: &str,
    depth: DepthBudget,
    stats: &mut CleanStats,
    log: &dyn Logger,
) -> Result<()> {
    let path = remote_join(parent, name);
    let mut dir = Descent::enter(session, name)?;
    tracing::info!("Cleaning directory: {}", path);

    let entries = match dir.list() {
        Ok(entries) => entries,
        Err(e) if e.is_fatal() => return Err(e),
        Err(e) => {
            tracing::debug!(%path, error = %e, "listing failed, treating as empty");
            Vec::new()
        }
    };
    remove_entries(&mut *dir, &path, &entries, depth, stats, log)?;
    dir.leave()
}

/// Remove everything inside the current remote directory, which is `here`.
///
/// Unlike [`erase_tree`], a failed listing is returned to the caller: at the
/// top level it is worth reporting, even though deployment carries on.
pub fn clean_current<S: RemoteSession + ?Sized>(
    session: &mut S,
    here: &str,
    depth: DepthBudget,
    stats: &mut CleanStats,
    log: &dyn Logger,
) -> Result<()> {
    let entries = session.list()?;
    remove_entries(session, here, &entries, depth, stats, log)
}
