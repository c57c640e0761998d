//! Blocking FTP client implementing [`RemoteSession`]
//!
//! One control connection, passive-mode data connections opened per transfer
//! (`EPSV` when the control connection is IPv6, `PASV` otherwise),
//! one request in flight. Every socket gets an explicit read/write deadline so
//! a stalled server surfaces as `SessionError::Timeout` instead of hanging.

use std::io::{self, BufReader, Read, Write};
use std::net::{IpAddr, Shutdown, SocketAddr, SocketAddrV4, TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::config::DeployConfig;
use crate::error::{Result, SessionError};
use crate::protocol::{reply, timeouts, DEFAULT_PORT, MAX_LIST_ENTRIES};
use crate::protocol_core::{
    self, build_command, listing_names, parse_epsv, parse_pasv, parse_pwd, Charset, Reply,
};
use crate::session::{Connector, RemoteSession};

/// Connection parameters for [`FtpSession`]
#[derive(Debug, Clone, Copy)]
pub struct FtpOptions {
    pub port: u16,
    pub timeout: Duration,
    pub charset: Charset,
}

impl Default for FtpOptions {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            timeout: Duration::from_secs(timeouts::DEFAULT_SECS),
            charset: Charset::utf8(),
        }
    }
}

impl From<&DeployConfig> for FtpOptions {
    fn from(cfg: &DeployConfig) -> Self {
        Self {
            port: cfg.port,
            timeout: cfg.timeout,
            charset: cfg.charset,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransferType {
    Ascii,
    Binary,
}

fn tune_socket(stream: &TcpStream, timeout: Duration) -> io::Result<()> {
    stream.set_read_timeout(Some(timeout))?;
    stream.set_write_timeout(Some(timeout))?;
    stream.set_nodelay(true)
}

pub struct FtpSession {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    peer: SocketAddr,
    opts: FtpOptions,
    transfer_type: Option<TransferType>,
    epsv_refused: bool,
}

impl FtpSession {
    /// Open the control connection and wait for the `220` greeting.
    pub fn connect(host: &str, opts: FtpOptions) -> Result<Self> {
        let addr = format!("{}:{}", host, opts.port);
        let connect_err = |source: io::Error| SessionError::Connect {
            addr: addr.clone(),
            source,
        };

        let mut last_err = io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses");
        let mut stream = None;
        // (host, port) rather than the joined string, so bare IPv6 literals resolve
        for candidate in (host, opts.port).to_socket_addrs().map_err(connect_err)? {
            match TcpStream::connect_timeout(&candidate, opts.timeout) {
                Ok(s) => {
                    stream = Some(s);
                    break;
                }
                Err(e) => last_err = e,
            }
        }
        let stream = stream.ok_or_else(|| connect_err(last_err))?;
        tune_socket(&stream, opts.timeout).map_err(connect_err)?;
        let peer = stream.peer_addr().map_err(connect_err)?;
        let writer = stream.try_clone().map_err(connect_err)?;

        let mut session = Self {
            reader: BufReader::new(stream),
            writer,
            peer,
            opts,
            transfer_type: None,
            epsv_refused: false,
        };

        // 120 means "ready in n minutes"; the real greeting follows
        let mut greeting = session.read_reply()?;
        while reply::is_preliminary(greeting.code) {
            greeting = session.read_reply()?;
        }
        if greeting.code != reply::SERVICE_READY {
            return Err(SessionError::Protocol(greeting));
        }
        tracing::debug!(%peer, charset = opts.charset.name(), "control connection open");
        Ok(session)
    }

    /// `USER` then, when asked for one, `PASS`.
    pub fn login(&mut self, user: &str, password: &str) -> Result<()> {
        let r = self.command("USER", Some(user))?;
        let r = match r.code {
            reply::LOGGED_IN => return Ok(()),
            reply::NEED_PASSWORD => self.command("PASS", Some(password))?,
            _ => return Err(SessionError::Auth(r)),
        };
        if r.code == reply::LOGGED_IN || r.code == reply::SUPERFLUOUS {
            Ok(())
        } else {
            Err(SessionError::Auth(r))
        }
    }

    fn read_reply(&mut self) -> Result<Reply> {
        let r = protocol_core::read_reply(&mut self.reader, self.opts.charset)?;
        tracing::trace!(code = r.code, text = %r.text, "<-");
        Ok(r)
    }

    fn send(&mut self, verb: &str, arg: Option<&str>) -> Result<()> {
        let line = build_command(verb, arg, self.opts.charset)?;
        if verb == "PASS" {
            tracing::trace!("-> PASS ****");
        } else {
            tracing::trace!(verb, arg = arg.unwrap_or(""), "->");
        }
        self.writer.write_all(&line)?;
        self.writer.flush()?;
        Ok(())
    }

    fn command(&mut self, verb: &str, arg: Option<&str>) -> Result<Reply> {
        self.send(verb, arg)?;
        let r = self.read_reply()?;
        if r.code == reply::SERVICE_CLOSING {
            return Err(SessionError::Io(io::Error::new(
                io::ErrorKind::ConnectionAborted,
                r.to_string(),
            )));
        }
        Ok(r)
    }

    /// Run a command whose success is any 2xx; 4xx/5xx are mapped by `refused`.
    fn simple(
        &mut self,
        verb: &str,
        arg: &str,
        refused: impl FnOnce(Reply) -> SessionError,
    ) -> Result<Reply> {
        let r = self.command(verb, Some(arg))?;
        if reply::is_completion(r.code) {
            Ok(r)
        } else if r.code >= 400 {
            Err(refused(r))
        } else {
            Err(SessionError::Protocol(r))
        }
    }

    fn set_type(&mut self, t: TransferType) -> Result<()> {
        if self.transfer_type == Some(t) {
            return Ok(());
        }
        let code = match t {
            TransferType::Ascii => "A",
            TransferType::Binary => "I",
        };
        let r = self.command("TYPE", Some(code))?;
        if r.code != reply::COMMAND_OK {
            return Err(SessionError::Protocol(r));
        }
        self.transfer_type = Some(t);
        Ok(())
    }

    /// Servers behind NAT often advertise a private or unspecified address in
    /// their PASV reply; the control peer is reachable, so use it instead.
    /// Over IPv6 the advertised IPv4 address is never usable and only the
    /// port is taken.
    fn data_address(&self, advertised: SocketAddrV4) -> SocketAddr {
        let ip = *advertised.ip();
        match self.peer.ip() {
            IpAddr::V4(peer) if ip.is_unspecified() || (ip.is_private() && !peer.is_private()) => {
                SocketAddr::new(IpAddr::V4(peer), advertised.port())
            }
            IpAddr::V6(peer) => SocketAddr::new(IpAddr::V6(peer), advertised.port()),
            _ => SocketAddr::V4(advertised),
        }
    }

    /// `EPSV` on IPv6 control connections. `None` means fall back to `PASV`,
    /// which is also remembered once the server refuses `EPSV` with a 5xx.
    fn extended_passive(&mut self) -> Result<Option<SocketAddr>> {
        if !self.peer.is_ipv6() || self.epsv_refused {
            return Ok(None);
        }
        let r = self.command("EPSV", None)?;
        if r.code == reply::EXTENDED_PASSIVE_MODE {
            return Ok(Some(SocketAddr::new(self.peer.ip(), parse_epsv(&r.text)?)));
        }
        if r.code >= 500 {
            tracing::debug!(reply = %r, "EPSV refused, using PASV");
            self.epsv_refused = true;
            return Ok(None);
        }
        Err(SessionError::Protocol(r))
    }

    fn open_passive(&mut self) -> Result<TcpStream> {
        let addr = match self.extended_passive()? {
            Some(addr) => addr,
            None => {
                let r = self.command("PASV", None)?;
                if r.code != reply::PASSIVE_MODE {
                    return Err(SessionError::Protocol(r));
                }
                self.data_address(parse_pasv(&r.text)?)
            }
        };
        let data = TcpStream::connect_timeout(&addr, self.opts.timeout)?;
        tune_socket(&data, self.opts.timeout)?;
        Ok(data)
    }

    /// Read the final reply of a data transfer (226 or 250).
    fn finish_transfer(&mut self) -> Result<()> {
        let done = self.read_reply()?;
        if done.code == reply::TRANSFER_COMPLETE || done.code == reply::FILE_ACTION_OK {
            Ok(())
        } else {
            Err(SessionError::Transfer(done))
        }
    }
}

impl RemoteSession for FtpSession {
    fn change_directory(&mut self, path: &str) -> Result<()> {
        self.simple("CWD", path, |reply| SessionError::NotFoundOrDenied {
            path: path.to_string(),
            reply,
        })?;
        Ok(())
    }

    fn current_directory(&mut self) -> Result<String> {
        let r = self.command("PWD", None)?;
        if r.code != reply::PATH_CREATED {
            return Err(SessionError::Protocol(r));
        }
        parse_pwd(&r.text)
    }

    fn list(&mut self) -> Result<Vec<String>> {
        self.set_type(TransferType::Ascii)?;
        let mut data = self.open_passive()?;
        let r = self.command("NLST", None)?;
        if r.code >= 400 {
            // 450/550 "No files found" on an empty directory
            return Err(SessionError::NotFoundOrDenied {
                path: ".".to_string(),
                reply: r,
            });
        }
        if !reply::is_preliminary(r.code) {
            return Err(SessionError::Protocol(r));
        }
        let mut raw = Vec::new();
        data.read_to_end(&mut raw)?;
        drop(data);
        self.finish_transfer()?;

        let listing = self.opts.charset.decode(&raw);
        let (names, truncated) = listing_names(&listing, MAX_LIST_ENTRIES);
        if truncated {
            tracing::warn!(
                "NLST returned more than {} entries; the rest of this directory is skipped",
                MAX_LIST_ENTRIES
            );
        }
        Ok(names)
    }

    fn delete(&mut self, name: &str) -> Result<()> {
        self.simple("DELE", name, |reply| SessionError::NotAFileOrDenied {
            name: name.to_string(),
            reply,
        })?;
        Ok(())
    }

    fn remove_directory(&mut self, name: &str) -> Result<()> {
        self.simple("RMD", name, |reply| SessionError::NotFoundOrDenied {
            path: name.to_string(),
            reply,
        })?;
        Ok(())
    }

    fn make_directory(&mut self, name: &str) -> Result<()> {
        self.simple("MKD", name, |reply| SessionError::NotFoundOrDenied {
            path: name.to_string(),
            reply,
        })?;
        Ok(())
    }

    fn store(&mut self, name: &str, reader: &mut dyn Read) -> Result<u64> {
        self.set_type(TransferType::Binary)?;
        let mut data = self.open_passive()?;
        let r = self.command("STOR", Some(name))?;
        if !reply::is_preliminary(r.code) {
            return Err(SessionError::Transfer(r));
        }
        let bytes = io::copy(reader, &mut data)?;
        data.flush()?;
        // EOF on the data connection marks the end of the file
        data.shutdown(Shutdown::Write).ok();
        drop(data);
        self.finish_transfer()?;
        Ok(bytes)
    }

    fn close(&mut self) -> Result<()> {
        let quit_deadline = Duration::from_millis(timeouts::QUIT_MS);
        self.writer.set_read_timeout(Some(quit_deadline)).ok();
        let r = self.command("QUIT", None);
        self.writer.shutdown(Shutdown::Both).ok();
        let r = r?;
        if r.code != reply::CLOSING {
            return Err(SessionError::Protocol(r));
        }
        Ok(())
    }
}

/// Opens [`FtpSession`]s with fixed options.
#[derive(Debug, Clone, Default)]
pub struct FtpConnector {
    pub opts: FtpOptions,
}

impl FtpConnector {
    pub fn new(opts: FtpOptions) -> Self {
        Self { opts }
    }
}

impl Connector for FtpConnector {
    type Session = FtpSession;

    fn connect(&mut self, host: &str, user: &str, password: &str) -> Result<FtpSession> {
        let mut session = FtpSession::connect(host, self.opts)?;
        session.login(user, password)?;
        Ok(session)
    }
}
