//! In-memory remote filesystem implementing [`RemoteSession`]
//!
//! Behaves like a typical FTP server: untyped NLST, DELE refuses
//! directories, RMD refuses non-empty directories, MKD refuses existing
//! names, and `..` at the root stays at the root. Clones share the same
//! filesystem but keep their own cursor, like two connections to one server.

use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::io::Read;
use std::sync::Arc;

use super::{Connector, RemoteSession};
use crate::error::{Result, SessionError};
use crate::protocol::reply;
use crate::protocol_core::Reply;

#[derive(Debug, Clone)]
enum Node {
    File(Vec<u8>),
    Dir(BTreeMap<String, Node>),
}

#[derive(Debug, Default)]
struct MemoryFs {
    root: BTreeMap<String, Node>,
    protected: HashSet<String>,
    unreadable: HashSet<String>,
    failing_stores: HashSet<String>,
    failing_parent: HashSet<String>,
    empty_listing_fails: bool,
    dot_entries: bool,
    journal: Vec<String>,
    credentials: Option<(String, String)>,
    connections: usize,
    closed: bool,
}

fn join(comps: &[String]) -> String {
    format!("/{}", comps.join("/"))
}

fn refused(text: &str) -> Reply {
    Reply::new(reply::FILE_UNAVAILABLE, text)
}

impl MemoryFs {
    fn dir(&self, comps: &[String]) -> Option<&BTreeMap<String, Node>> {
        let mut cur = &self.root;
        for c in comps {
            cur = match cur.get(c) {
                Some(Node::Dir(children)) => children,
                _ => return None,
            };
        }
        Some(cur)
    }

    fn dir_mut(&mut self, comps: &[String]) -> Option<&mut BTreeMap<String, Node>> {
        let mut cur = &mut self.root;
        for c in comps {
            cur = match cur.get_mut(c) {
                Some(Node::Dir(children)) => children,
                _ => return None,
            };
        }
        Some(cur)
    }

    fn node(&self, comps: &[String]) -> Option<&Node> {
        let (last, parent) = comps.split_last()?;
        self.dir(parent)?.get(last)
    }

    fn collect(prefix: &str, dir: &BTreeMap<String, Node>, out: &mut Vec<String>) {
        for (name, node) in dir {
            let path = format!("{}/{}", prefix, name);
            match node {
                Node::File(_) => out.push(path),
                Node::Dir(children) => {
                    out.push(format!("{}/", path));
                    Self::collect(&path, children, out);
                }
            }
        }
    }
}

/// Shared in-memory server plus a private cursor.
#[derive(Debug, Clone, Default)]
pub struct MemorySession {
    fs: Arc<Mutex<MemoryFs>>,
    cwd: Vec<String>,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    fn resolve(&self, path: &str) -> Vec<String> {
        let mut comps = if path.starts_with('/') {
            Vec::new()
        } else {
            self.cwd.clone()
        };
        for seg in path.split('/') {
            match seg {
                "" | "." => {}
                ".." => {
                    comps.pop();
                }
                s => comps.push(s.to_string()),
            }
        }
        comps
    }

    /// Create a directory and any missing parents.
    pub fn add_dir(&self, path: &str) {
        let comps = self.resolve(path);
        let mut fs = self.fs.lock();
        let mut cur = &mut fs.root;
        for c in comps {
            let entry = cur.entry(c).or_insert_with(|| Node::Dir(BTreeMap::new()));
            if !matches!(entry, Node::Dir(_)) {
                *entry = Node::Dir(BTreeMap::new());
            }
            let Node::Dir(children) = entry else { return };
            cur = children;
        }
    }

    /// Create a file (and its parent directories).
    pub fn add_file(&self, path: &str, contents: &[u8]) {
        let mut comps = self.resolve(path);
        let Some(name) = comps.pop() else { return };
        self.add_dir(&join(&comps));
        let mut fs = self.fs.lock();
        if let Some(dir) = fs.dir_mut(&comps) {
            dir.insert(name, Node::File(contents.to_vec()));
        }
    }

    /// Make DELE and RMD on this absolute path always fail.
    pub fn protect(&self, path: &str) {
        self.fs.lock().protected.insert(join(&self.resolve(path)));
    }

    /// Make NLST inside this absolute path fail.
    pub fn make_unreadable(&self, path: &str) {
        self.fs.lock().unreadable.insert(join(&self.resolve(path)));
    }

    /// Make STOR to this absolute path fail with a 451.
    pub fn fail_store_at(&self, path: &str) {
        self.fs.lock().failing_stores.insert(join(&self.resolve(path)));
    }

    /// Refuse the next `CWD ..` issued while the cursor is at this path.
    pub fn fail_leaving(&self, path: &str) {
        self.fs.lock().failing_parent.insert(join(&self.resolve(path)));
    }

    /// Answer NLST on an empty directory with `550 No files found`, as many servers do.
    pub fn with_empty_listing_error(self) -> Self {
        self.fs.lock().empty_listing_fails = true;
        self
    }

    /// Include `.` and `..` in listings.
    pub fn with_dot_entries(self) -> Self {
        self.fs.lock().dot_entries = true;
        self
    }

    /// Reject logins that do not match.
    pub fn with_credentials(self, user: &str, password: &str) -> Self {
        self.fs.lock().credentials = Some((user.to_string(), password.to_string()));
        self
    }

    /// Number of successful or attempted connections made through [`Connector`].
    pub fn connections(&self) -> usize {
        self.fs.lock().connections
    }

    pub fn read_file(&self, path: &str) -> Option<Vec<u8>> {
        match self.fs.lock().node(&self.resolve(path)) {
            Some(Node::File(bytes)) => Some(bytes.clone()),
            _ => None,
        }
    }

    pub fn is_dir(&self, path: &str) -> bool {
        self.fs.lock().dir(&self.resolve(path)).is_some()
    }

    /// Every path under `root`, relative to it, sorted. Directories end in `/`.
    pub fn tree(&self, root: &str) -> Vec<String> {
        let fs = self.fs.lock();
        let mut out = Vec::new();
        if let Some(dir) = fs.dir(&self.resolve(root)) {
            MemoryFs::collect("", dir, &mut out);
        }
        out.into_iter()
            .map(|p| p.trim_start_matches('/').to_string())
            .collect()
    }

    /// Mutations in the order the server saw them, e.g. `DELE /site/a.txt`.
    pub fn journal(&self) -> Vec<String> {
        self.fs.lock().journal.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.fs.lock().closed
    }
}

impl RemoteSession for MemorySession {
    fn change_directory(&mut self, path: &str) -> Result<()> {
        let comps = self.resolve(path);
        let mut fs = self.fs.lock();
        if path == ".." && fs.failing_parent.remove(&join(&self.cwd)) {
            return Err(SessionError::NotFoundOrDenied {
                path: path.to_string(),
                reply: refused("Permission denied"),
            });
        }
        if fs.dir(&comps).is_none() {
            return Err(SessionError::NotFoundOrDenied {
                path: path.to_string(),
                reply: refused("No such file or directory"),
            });
        }
        self.cwd = comps;
        Ok(())
    }

    fn current_directory(&mut self) -> Result<String> {
        Ok(join(&self.cwd))
    }

    fn list(&mut self) -> Result<Vec<String>> {
        let fs = self.fs.lock();
        let here = join(&self.cwd);
        let dir = match fs.dir(&self.cwd) {
            Some(dir) if !fs.unreadable.contains(&here) => dir,
            _ => {
                return Err(SessionError::NotFoundOrDenied {
                    path: here,
                    reply: Reply::new(reply::FILE_UNAVAILABLE, "Permission denied"),
                })
            }
        };
        if dir.is_empty() && fs.empty_listing_fails {
            return Err(SessionError::NotFoundOrDenied {
                path: here,
                reply: Reply::new(reply::FILE_UNAVAILABLE, "No files found"),
            });
        }
        let mut names: Vec<String> = Vec::with_capacity(dir.len() + 2);
        if fs.dot_entries {
            names.push(".".to_string());
            names.push("..".to_string());
        }
        names.extend(dir.keys().cloned());
        Ok(names)
    }

    fn delete(&mut self, name: &str) -> Result<()> {
        let mut comps = self.resolve(name);
        let path = join(&comps);
        let not_a_file = || SessionError::NotAFileOrDenied {
            name: name.to_string(),
            reply: refused("Not a plain file or permission denied"),
        };
        let mut fs = self.fs.lock();
        if fs.protected.contains(&path) || !matches!(fs.node(&comps), Some(Node::File(_))) {
            return Err(not_a_file());
        }
        let leaf = comps.pop().ok_or_else(not_a_file)?;
        if let Some(dir) = fs.dir_mut(&comps) {
            dir.remove(&leaf);
        }
        fs.journal.push(format!("DELE {}", path));
        Ok(())
    }

    fn remove_directory(&mut self, name: &str) -> Result<()> {
        let mut comps = self.resolve(name);
        let path = join(&comps);
        let refuse = |text: &str| SessionError::NotFoundOrDenied {
            path: name.to_string(),
            reply: refused(text),
        };
        let mut fs = self.fs.lock();
        if fs.protected.contains(&path) {
            return Err(refuse("Permission denied"));
        }
        match fs.node(&comps) {
            Some(Node::Dir(children)) if children.is_empty() => {}
            Some(Node::Dir(_)) => return Err(refuse("Directory not empty")),
            _ => return Err(refuse("No such directory")),
        }
        let leaf = comps.pop().ok_or_else(|| refuse("Permission denied"))?;
        if let Some(dir) = fs.dir_mut(&comps) {
            dir.remove(&leaf);
        }
        fs.journal.push(format!("RMD {}", path));
        Ok(())
    }

    fn make_directory(&mut self, name: &str) -> Result<()> {
        let mut comps = self.resolve(name);
        let path = join(&comps);
        let refuse = |text: &str| SessionError::NotFoundOrDenied {
            path: name.to_string(),
            reply: refused(text),
        };
        let mut fs = self.fs.lock();
        if fs.node(&comps).is_some() {
            return Err(refuse("File exists"));
        }
        let leaf = comps.pop().ok_or_else(|| refuse("File exists"))?;
        let parent = fs.dir_mut(&comps).ok_or_else(|| refuse("No such directory"))?;
        parent.insert(leaf, Node::Dir(BTreeMap::new()));
        fs.journal.push(format!("MKD {}", path));
        Ok(())
    }

    fn store(&mut self, name: &str, reader: &mut dyn Read) -> Result<u64> {
        let mut comps = self.resolve(name);
        let path = join(&comps);
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;

        let mut fs = self.fs.lock();
        if fs.failing_stores.contains(&path) {
            return Err(SessionError::Transfer(Reply::new(
                451,
                "Requested action aborted: local error in processing",
            )));
        }
        if let Some(Node::Dir(_)) = fs.node(&comps) {
            return Err(SessionError::Transfer(Reply::new(
                reply::FILE_UNAVAILABLE,
                "Is a directory",
            )));
        }
        let leaf = comps.pop().ok_or_else(|| {
            SessionError::Transfer(Reply::new(reply::FILE_UNAVAILABLE, "Invalid name"))
        })?;
        let parent = fs.dir_mut(&comps).ok_or_else(|| {
            SessionError::Transfer(Reply::new(reply::FILE_UNAVAILABLE, "No such directory"))
        })?;
        let len = bytes.len() as u64;
        parent.insert(leaf, Node::File(bytes));
        fs.journal.push(format!("STOR {}", path));
        Ok(len)
    }

    fn close(&mut self) -> Result<()> {
        self.fs.lock().closed = true;
        Ok(())
    }
}

impl Connector for MemorySession {
    type Session = MemorySession;

    fn connect(&mut self, _host: &str, user: &str, password: &str) -> Result<MemorySession> {
        let mut fs = self.fs.lock();
        fs.connections += 1;
        if let Some((u, p)) = &fs.credentials {
            if u != user || p != password {
                return Err(SessionError::Auth(Reply::new(
                    reply::NOT_LOGGED_IN,
                    "Login incorrect.",
                )));
            }
        }
        fs.closed = false;
        Ok(MemorySession {
            fs: Arc::clone(&self.fs),
            cwd: Vec::new(),
        })
    }
}
