//! ftpsync library
//!
//! Replaces a remote FTP web root with the contents of a local build
//! directory: recursive remote erase, recursive upload, then the custom error
//! page into its own directory.

pub mod cli;
pub mod config;
pub mod deploy;
pub mod eraser;
pub mod error;
pub mod frontmatter;
pub mod logger;
pub mod net;
pub mod progress;
pub mod protocol;
pub mod protocol_core;
pub mod session;
pub mod uploader;

pub use config::{DeployConfig, Settings};
pub use deploy::{deploy, DeployReport, Deployer};
pub use error::{ConfigError, DeployError, SessionError};
pub use net::{FtpConnector, FtpOptions, FtpSession};
pub use session::{Connector, RemoteSession};
