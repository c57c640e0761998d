//! Remote session capability set and the directory cursor guard
//!
//! A remote session has exactly one piece of mutable state that matters to
//! callers: its current working directory. All traversal code goes through
//! [`Descent`] so that every `CWD name` is paired with exactly one `CWD ..`,
//! whether the work inside the directory succeeded or not.

pub mod memory;

use std::io::Read;
use std::ops::{Deref, DerefMut};

use crate::error::{Result, SessionError};

pub use memory::MemorySession;

/// Directory-scoped primitives of one sequential, blocking connection.
///
/// Every call blocks until the server answers. There is never more than one
/// request in flight.
pub trait RemoteSession {
    /// `CWD`. Relative or absolute. Fails with `NotFoundOrDenied`.
    fn change_directory(&mut self, path: &str) -> Result<()>;

    /// `PWD`
    fn current_directory(&mut self) -> Result<String>;

    /// `NLST` of the current directory. Servers answer an empty directory either
    /// with an empty listing or with an error, so callers must treat both alike.
    fn list(&mut self) -> Result<Vec<String>>;

    /// `DELE`. Fails with `NotAFileOrDenied` for directories and protected files.
    fn delete(&mut self, name: &str) -> Result<()>;

    /// `RMD`. Fails when the directory is non-empty or protected.
    fn remove_directory(&mut self, name: &str) -> Result<()>;

    /// `MKD`. Fails when the name already exists.
    fn make_directory(&mut self, name: &str) -> Result<()>;

    /// `STOR` the reader's bytes under `name`. Returns the byte count.
    fn store(&mut self, name: &str, reader: &mut dyn Read) -> Result<u64>;

    /// `QUIT`
    fn close(&mut self) -> Result<()>;
}

/// Opens authenticated sessions. Connect and login are the only primitives
/// that are not scoped to a directory, so they live outside [`RemoteSession`].
pub trait Connector {
    type Session: RemoteSession;

    fn connect(&mut self, host: &str, user: &str, password: &str) -> Result<Self::Session>;
}

/// Remaining recursion allowance for a traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthBudget {
    limit: usize,
    used: usize,
}

impl DepthBudget {
    pub fn new(limit: usize) -> Self {
        Self { limit, used: 0 }
    }

    /// Budget for one level further down, or `DepthExceeded`.
    pub fn descend(self) -> Result<Self> {
        if self.used >= self.limit {
            return Err(SessionError::DepthExceeded { limit: self.limit });
        }
        Ok(Self {
            used: self.used + 1,
            ..self
        })
    }
}

/// A descent into a child directory that ascends again when it ends.
///
/// [`Descent::leave`] ascends and reports failure. If the guard is dropped
/// without `leave` (an early `?` return) the ascent still happens in `Drop`,
/// and a failure there is logged.
pub struct Descent<'a, S: RemoteSession + ?Sized> {
    session: &'a mut S,
    name: String,
    left: bool,
}

impl<'a, S: RemoteSession + ?Sized> Descent<'a, S> {
    /// `CWD name`. On failure nothing was entered and nothing needs undoing.
    pub fn enter(session: &'a mut S, name: &str) -> Result<Self> {
        session.change_directory(name)?;
        Ok(Self {
            session,
            name: name.to_string(),
            left: false,
        })
    }

    /// `CWD ..`. A failed ascent leaves the cursor somewhere unknown, which
    /// poisons every later relative operation, so it is reported as `CursorLost`.
    pub fn leave(mut self) -> Result<()> {
        self.left = true;
        self.session
            .change_directory("..")
            .map_err(|e| match e {
                e if e.is_fatal() => e,
                e => SessionError::CursorLost {
                    dir: self.name.clone(),
                    reason: e.to_string(),
                },
            })
    }
}

impl<S: RemoteSession + ?Sized> Deref for Descent<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.session
    }
}

impl<S: RemoteSession + ?Sized> DerefMut for Descent<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        self.session
    }
}

impl<S: RemoteSession + ?Sized> Drop for Descent<'_, S> {
    fn drop(&mut self) {
        if self.left {
            return;
        }
        if let Err(e) = self.session.change_directory("..") {
            tracing::warn!(dir = %self.name, error = %e, "failed to return to parent directory");
        }
    }
}
