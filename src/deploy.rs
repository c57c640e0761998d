//! Deployment orchestration: connect, clean the remote root, upload, place the error page

use std::path::Path;
use std::time::Instant;

use crate::config::{DeployConfig, Settings};
use crate::eraser::{clean_current, CleanStats};
use crate::error::{DeployError, SessionError};
use crate::logger::Logger;
use crate::session::{Connector, DepthBudget, RemoteSession};
use crate::uploader::{upload_file, upload_tree, UploadStats};

/// What one run did
#[derive(Debug, Default, Clone)]
pub struct DeployReport {
    pub clean: CleanStats,
    pub upload: UploadStats,
    /// The top-level listing of the remote root failed, so nothing was removed.
    pub cleanup_listing_failed: bool,
    pub error_page_placed: bool,
}

pub struct Deployer<'a> {
    config: &'a DeployConfig,
    log: &'a dyn Logger,
}

/// `error_dir` relative to `root` when it lies below it.
fn relative_to<'p>(path: &'p str, root: &str) -> Option<&'p str> {
    let rest = if root == "/" {
        path.strip_prefix('/')?
    } else {
        path.strip_prefix(root)?.strip_prefix('/')?
    };
    (!rest.is_empty()).then_some(rest)
}

impl<'a> Deployer<'a> {
    pub fn new(config: &'a DeployConfig, log: &'a dyn Logger) -> Self {
        Self { config, log }
    }

    /// Run one deployment over a session from `connector`.
    ///
    /// The session is closed on every path once login succeeded. Per-entry
    /// upload failures do not stop the run but turn its result into
    /// [`DeployError::UploadIncomplete`].
    pub fn run<C: Connector>(&self, connector: &mut C) -> Result<DeployReport, DeployError> {
        let cfg = self.config;
        if !cfg.source_dir.is_dir() {
            return Err(DeployError::SourceMissing(cfg.source_dir.clone()));
        }

        let start = Instant::now();
        tracing::info!("Connecting to FTP: {}", cfg.host);
        let mut session = connector.connect(&cfg.host, &cfg.username, &cfg.password)?;
        tracing::info!("Login successful");
        self.log.start(&cfg.source_dir, &cfg.host, &cfg.remote_root);

        let result = self.deploy_with(&mut session);

        match session.close() {
            Ok(()) => tracing::info!("FTP connection closed"),
            Err(e) => tracing::warn!("Failed to close FTP connection cleanly: {}", e),
        }

        let report = result?;
        self.log.done(
            report.upload.files_uploaded,
            report.upload.bytes_uploaded,
            start.elapsed().as_secs_f64(),
        );
        if !report.upload.errors.is_empty() {
            return Err(DeployError::UploadIncomplete {
                failed: report.upload.errors.len(),
            });
        }
        Ok(report)
    }

    fn deploy_with<S: RemoteSession>(&self, session: &mut S) -> Result<DeployReport, DeployError> {
        let cfg = self.config;
        let root = cfg.remote_root.as_str();
        session.change_directory(root).map_err(|source| {
            if source.is_fatal() {
                DeployError::Session(source)
            } else {
                DeployError::RemoteRootUnavailable {
                    path: root.to_string(),
                    source,
                }
            }
        })?;

        let depth = DepthBudget::new(cfg.max_depth);
        let mut report = DeployReport::default();

        tracing::info!("Starting cleanup of remote directory...");
        match clean_current(session, root, depth, &mut report.clean, self.log) {
            Ok(()) => tracing::info!(
                "Cleanup finished: {} files and {} directories removed",
                report.clean.files_deleted,
                report.clean.dirs_removed
            ),
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => {
                tracing::error!("Error while cleaning remote directory: {}", e);
                self.log.error("clean", root, &e.to_string());
                report.cleanup_listing_failed = true;
            }
        }
        if report.cleanup_listing_failed || !report.clean.failures.is_empty() {
            tracing::warn!("Continuing with upload despite cleanup errors...");
        }

        tracing::info!("Starting upload...");
        upload_tree(session, &cfg.source_dir, root, depth, &mut report.upload, self.log)?;
        tracing::info!(
            "Uploaded {} files ({} bytes)",
            report.upload.files_uploaded,
            report.upload.bytes_uploaded
        );

        let page = cfg.source_dir.join(&cfg.error_page);
        if page.is_file() {
            match self.place_error_page(session, &page) {
                Ok(()) => {
                    tracing::info!("Uploaded {} to {}", cfg.error_page, cfg.error_dir);
                    report.error_page_placed = true;
                }
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => {
                    tracing::warn!("Failed to upload {} to {}: {}", cfg.error_page, cfg.error_dir, e);
                    self.log.error("error-page", &cfg.error_dir, &e.to_string());
                }
            }
        } else {
            tracing::debug!("No {} in {}, skipping error page", cfg.error_page, cfg.source_dir.display());
        }

        tracing::info!("Deployment complete.");
        Ok(report)
    }

    /// Put the error page into `error_dir`, creating the directory if needed.
    fn place_error_page<S: RemoteSession>(&self, session: &mut S, page: &Path) -> Result<(), SessionError> {
        let cfg = self.config;
        session.change_directory("/")?;
        if let Err(e) = session.change_directory(&cfg.error_dir) {
            if e.is_fatal() {
                return Err(e);
            }
            tracing::debug!(dir = %cfg.error_dir, error = %e, "error page directory missing, creating it");
            session.change_directory(&cfg.remote_root)?;
            let target = relative_to(&cfg.error_dir, &cfg.remote_root).unwrap_or(cfg.error_dir.as_str());
            match session.make_directory(target) {
                Ok(()) => self.log.make_dir(&cfg.error_dir),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => tracing::debug!(dir = %cfg.error_dir, error = %e, "MKD refused"),
            }
            session.change_directory(target)?;
        }

        let target = crate::eraser::remote_join(&cfg.error_dir, &cfg.error_page);
        let bytes = upload_file(session, page, &cfg.error_page)?;
        self.log.store_done(page, &target, bytes);
        Ok(())
    }
}

/// Resolve configuration and run a deployment.
///
/// Configuration errors are returned before `connector_for` is called, so a
/// bad environment never opens a connection.
pub fn deploy<C, F>(
    env: impl Fn(&str) -> Option<String>,
    settings: Settings,
    connector_for: F,
    log: &dyn Logger,
) -> Result<DeployReport, DeployError>
where
    C: Connector,
    F: FnOnce(&DeployConfig) -> C,
{
    let config = DeployConfig::resolve(env, settings)?;
    tracing::debug!(?config, "resolved configuration");
    let mut connector = connector_for(&config);
    Deployer::new(&config, log).run(&mut connector)
}
