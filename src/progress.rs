//! Spinner-style progress display
//!
//! A single status line at the bottom of the terminal, updated from the same
//! events the journal receives. Hidden unless `--progress` is given.
//!
//! Log output goes through [`ProgressWriter`], which clears the spinner line
//! before each write so the two never interleave on stderr.

use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::logger::Logger;

#[derive(Default)]
struct Counters {
    deleted: AtomicU64,
    created: AtomicU64,
    files: AtomicU64,
    bytes: AtomicU64,
}

#[derive(Clone)]
pub struct Progress {
    spinner: ProgressBar,
    start_time: Instant,
    counters: Arc<Counters>,
}

impl Progress {
    pub fn new(enabled: bool) -> Self {
        let spinner = if enabled {
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner())
                    .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
            );
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        } else {
            ProgressBar::hidden()
        };
        Self {
            spinner,
            start_time: Instant::now(),
            counters: Arc::new(Counters::default()),
        }
    }

    fn status(&self, stage: &str) -> String {
        let c = &self.counters;
        format!(
            "{} in {:.1}s - {} removed, {} dirs created, {} files ({:.2} MB) uploaded",
            stage,
            self.start_time.elapsed().as_secs_f64(),
            c.deleted.load(Ordering::Relaxed),
            c.created.load(Ordering::Relaxed),
            c.files.load(Ordering::Relaxed),
            c.bytes.load(Ordering::Relaxed) as f64 / 1_048_576.0
        )
    }

    fn refresh(&self, stage: &str) {
        self.spinner.set_message(self.status(stage));
    }

    /// Writer for log output that shares the terminal with the spinner.
    pub fn writer(&self) -> ProgressWriter {
        ProgressWriter {
            spinner: self.spinner.clone(),
        }
    }
}

/// Writes to stderr with the spinner suspended.
#[derive(Clone)]
pub struct ProgressWriter {
    spinner: ProgressBar,
}

impl Write for ProgressWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.spinner
            .suspend(|| io::stderr().write_all(buf))
            .map(|()| buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for ProgressWriter {
    type Writer = ProgressWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

impl Logger for Progress {
    fn start(&self, _src: &Path, host: &str, _remote_root: &str) {
        self.spinner.set_message(format!("Connected to {}", host));
    }
    fn delete(&self, _remote: &str) {
        self.counters.deleted.fetch_add(1, Ordering::Relaxed);
        self.refresh("Cleaning");
    }
    fn remove_dir(&self, _remote: &str) {
        self.counters.deleted.fetch_add(1, Ordering::Relaxed);
        self.refresh("Cleaning");
    }
    fn make_dir(&self, _remote: &str) {
        self.counters.created.fetch_add(1, Ordering::Relaxed);
        self.refresh("Uploading");
    }
    fn store_done(&self, _local: &Path, _remote: &str, bytes: u64) {
        self.counters.files.fetch_add(1, Ordering::Relaxed);
        self.counters.bytes.fetch_add(bytes, Ordering::Relaxed);
        self.refresh("Uploading");
    }
    fn done(&self, _files: u64, _bytes: u64, _seconds: f64) {
        self.spinner.finish_with_message(self.status("Finished"));
    }
}
