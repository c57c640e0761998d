//! Command-line interface definitions

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Settings;

#[derive(Debug, Parser)]
#[command(
    name = "ftpsync",
    author,
    version,
    about = "Replace a remote FTP web root with a local build directory"
)]
pub struct Cli {
    /// Debug-level logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Erase the remote root, upload the local build, place the error page
    Deploy(DeployOpts),
    /// Repair Markdown content: front matter on the first line, no duplicate
    /// keys, trailing newline
    #[command(alias = "fix-markdown")]
    FixFrontmatter(FixOpts),
}

/// Options for `deploy`. Credentials come from FTP_HOST, FTP_USERNAME and FTP_PASSWORD.
#[derive(Clone, Debug, Default, Args)]
pub struct DeployOpts {
    /// Local build directory [default: dist]
    #[arg(long = "source")]
    pub source: Option<PathBuf>,

    /// Remote directory to replace [default: /wwwroot]
    #[arg(long)]
    pub remote_root: Option<String>,

    /// File name of the custom error page [default: 404.html]
    #[arg(long)]
    pub error_page: Option<String>,

    /// Remote directory that receives the error page [default: /wwwroot/_HttpErrors]
    #[arg(long)]
    pub error_dir: Option<String>,

    /// Control port (falls back to FTP_PORT, then 21)
    #[arg(long)]
    pub port: Option<u16>,

    /// Filename encoding used by the server, e.g. gbk [default: utf-8]
    #[arg(long)]
    pub encoding: Option<String>,

    /// Socket timeout in seconds [default: 30]
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Maximum directory depth for cleanup and upload [default: 64]
    #[arg(long)]
    pub max_depth: Option<usize>,

    /// TOML file with the same settings; flags take precedence
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Append a journal of every remote change to this file
    #[arg(long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// Show a live status line
    #[arg(short, long)]
    pub progress: bool,
}

impl DeployOpts {
    /// Settings given on the command line
    pub fn overrides(&self) -> Settings {
        Settings {
            source_dir: self.source.clone(),
            remote_root: self.remote_root.clone(),
            error_page: self.error_page.clone(),
            error_dir: self.error_dir.clone(),
            port: self.port,
            encoding: self.encoding.clone(),
            timeout_secs: self.timeout_secs,
            max_depth: self.max_depth,
        }
    }
}

#[derive(Clone, Debug, Args)]
pub struct FixOpts {
    /// Content directory to scan
    #[arg(default_value = "src/content")]
    pub root: PathBuf,

    /// File extension to process
    #[arg(long, default_value = "md")]
    pub ext: String,
}
