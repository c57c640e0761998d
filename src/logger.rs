use anyhow::Result;
use chrono::Utc;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

/// Observer of remote mutations. Console output goes through `tracing`;
/// this is the durable record of what was changed on the server.
pub trait Logger: Send + Sync {
    fn start(&self, _src: &Path, _host: &str, _remote_root: &str) {}
    fn delete(&self, _remote: &str) {}
    fn remove_dir(&self, _remote: &str) {}
    fn make_dir(&self, _remote: &str) {}
    fn store_done(&self, _local: &Path, _remote: &str, _bytes: u64) {}
    fn error(&self, _context: &str, _target: &str, _msg: &str) {}
    fn done(&self, _files: u64, _bytes: u64, _seconds: f64) {}
}

pub struct NoopLogger;
impl Logger for NoopLogger {}

/// Append-only text journal, one timestamped line per event
pub struct TextLogger {
    file: Mutex<File>,
}

impl TextLogger {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let f = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(f),
        })
    }

    fn line(&self, s: &str) {
        let mut f = self.file.lock();
        let _ = writeln!(f, "[{}] {}", Utc::now().to_rfc3339(), s);
    }
}

impl Logger for TextLogger {
    fn start(&self, src: &Path, host: &str, remote_root: &str) {
        self.line(&format!(
            "START src={} host={} root={}",
            src.display(),
            host,
            remote_root
        ));
    }
    fn delete(&self, remote: &str) {
        self.line(&format!("DELE path={}", remote));
    }
    fn remove_dir(&self, remote: &str) {
        self.line(&format!("RMD path={}", remote));
    }
    fn make_dir(&self, remote: &str) {
        self.line(&format!("MKD path={}", remote));
    }
    fn store_done(&self, local: &Path, remote: &str, bytes: u64) {
        self.line(&format!(
            "STOR src={} dst={} bytes={}",
            local.display(),
            remote,
            bytes
        ));
    }
    fn error(&self, context: &str, target: &str, msg: &str) {
        self.line(&format!("ERROR ctx={} path={} msg={}", context, target, msg));
    }
    fn done(&self, files: u64, bytes: u64, seconds: f64) {
        self.line(&format!("DONE files={files} bytes={bytes} seconds={seconds:.3}"));
    }
}

/// Fans every event out to several loggers (journal file, progress display)
#[derive(Default)]
pub struct MultiLogger {
    inner: Vec<Box<dyn Logger>>,
}

impl MultiLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, logger: impl Logger + 'static) -> Self {
        self.inner.push(Box::new(logger));
        self
    }
}

impl Logger for MultiLogger {
    fn start(&self, src: &Path, host: &str, remote_root: &str) {
        self.inner.iter().for_each(|l| l.start(src, host, remote_root));
    }
    fn delete(&self, remote: &str) {
        self.inner.iter().for_each(|l| l.delete(remote));
    }
    fn remove_dir(&self, remote: &str) {
        self.inner.iter().for_each(|l| l.remove_dir(remote));
    }
    fn make_dir(&self, remote: &str) {
        self.inner.iter().for_each(|l| l.make_dir(remote));
    }
    fn store_done(&self, local: &Path, remote: &str, bytes: u64) {
        self.inner.iter().for_each(|l| l.store_done(local, remote, bytes));
    }
    fn error(&self, context: &str, target: &str, msg: &str) {
        self.inner.iter().for_each(|l| l.error(context, target, msg));
    }
    fn done(&self, files: u64, bytes: u64, seconds: f64) {
        self.inner.iter().for_each(|l| l.done(files, bytes, seconds));
    }
}
