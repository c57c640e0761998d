//! Loopback FTP server for integration tests
//!
//! Speaks enough of RFC 959 and RFC 2428 (USER, PASS, PWD, CWD, TYPE, PASV,
//! EPSV, NLST, STOR, DELE, MKD, RMD, QUIT) for the client, backed by a [`MemorySession`] so
//! tests can seed and inspect the remote tree.

#![allow(dead_code)]

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{IpAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;

use ftpsync::protocol_core::Charset;
use ftpsync::session::{Connector, MemorySession, RemoteSession};
use ftpsync::SessionError;

pub struct TestServer {
    pub port: u16,
    pub fs: MemorySession,
    commands: Arc<Mutex<Vec<String>>>,
}

impl TestServer {
    pub fn start(fs: MemorySession) -> Self {
        Self::start_with(fs, Charset::utf8())
    }

    pub fn start_with(fs: MemorySession, charset: Charset) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        Self::spawn(listener, fs, charset, true)
    }

    /// Listen on IPv6 loopback. `None` when the host has no IPv6.
    pub fn start_ipv6(fs: MemorySession, epsv: bool) -> Option<Self> {
        let listener = TcpListener::bind("[::1]:0").ok()?;
        Some(Self::spawn(listener, fs, Charset::utf8(), epsv))
    }

    /// Serve connections one after another until the test process exits.
    fn spawn(listener: TcpListener, fs: MemorySession, charset: Charset, epsv: bool) -> Self {
        let port = listener.local_addr().unwrap().port();
        let commands = Arc::new(Mutex::new(Vec::new()));

        let server_fs = fs.clone();
        let server_log = Arc::clone(&commands);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                let _ = serve(stream, server_fs.clone(), charset, epsv, &server_log);
            }
        });

        Self { port, fs, commands }
    }

    /// Every command received so far, `PASS` arguments masked
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }

    pub fn verbs(&self) -> Vec<String> {
        self.commands()
            .iter()
            .map(|c| c.split(' ').next().unwrap_or("").to_string())
            .collect()
    }
}

fn send(w: &mut TcpStream, charset: Charset, text: &str) -> std::io::Result<()> {
    let mut bytes = charset.encode(text).unwrap_or_else(|_| text.as_bytes().to_vec());
    bytes.extend_from_slice(b"\r\n");
    w.write_all(&bytes)
}

fn failure(e: &SessionError) -> String {
    match e {
        SessionError::Transfer(r) | SessionError::Auth(r) => r.to_string(),
        SessionError::NotFoundOrDenied { reply, .. } | SessionError::NotAFileOrDenied { reply, .. } => {
            reply.to_string()
        }
        other => format!("451 {}", other),
    }
}

fn serve(
    stream: TcpStream,
    mut fs: MemorySession,
    charset: Charset,
    epsv: bool,
    log: &Mutex<Vec<String>>,
) -> std::io::Result<()> {
    let local_ip = stream.local_addr()?.ip();
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut w = stream;
    w.write_all(b"220-Test FTP server\r\n220 Ready\r\n")?;

    let mut user = String::new();
    let mut session: Option<MemorySession> = None;
    let mut passive: Option<TcpListener> = None;

    loop {
        let mut raw = Vec::new();
        if reader.read_until(b'\n', &mut raw)? == 0 {
            return Ok(());
        }
        while matches!(raw.last(), Some(b'\n' | b'\r')) {
            raw.pop();
        }
        let line = charset.decode(&raw);
        let (verb, arg) = match line.split_once(' ') {
            Some((v, a)) => (v.to_ascii_uppercase(), a.to_string()),
            None => (line.to_ascii_uppercase(), String::new()),
        };
        log.lock().push(if verb == "PASS" {
            "PASS ****".to_string()
        } else {
            line.clone()
        });

        if verb == "USER" {
            user = arg;
            send(&mut w, charset, "331 Password required")?;
            continue;
        }
        if verb == "PASS" {
            match fs.connect("127.0.0.1", &user, &arg) {
                Ok(s) => {
                    session = Some(s);
                    send(&mut w, charset, "230 Logged in")?;
                }
                Err(_) => send(&mut w, charset, "530 Login incorrect.")?,
            }
            continue;
        }
        if verb == "QUIT" {
            if let Some(s) = session.as_mut() {
                let _ = s.close();
            }
            send(&mut w, charset, "221 Goodbye")?;
            return Ok(());
        }
        let Some(s) = session.as_mut() else {
            send(&mut w, charset, "530 Please login with USER and PASS")?;
            continue;
        };

        let reply = match verb.as_str() {
            "PWD" => {
                let here = s.current_directory().unwrap_or_default();
                format!("257 \"{}\" is the current directory", here.replace('"', "\"\""))
            }
            "CWD" => match s.change_directory(&arg) {
                Ok(()) => "250 Directory changed".to_string(),
                Err(e) => failure(&e),
            },
            "TYPE" => format!("200 Type set to {}", arg),
            "PASV" => {
                let data = TcpListener::bind((local_ip, 0))?;
                let p = data.local_addr()?.port();
                passive = Some(data);
                // An IPv6 server has no IPv4 address to advertise
                let host = match local_ip {
                    IpAddr::V4(ip) => ip.octets().map(|o| o.to_string()).join(","),
                    IpAddr::V6(_) => "0,0,0,0".to_string(),
                };
                format!("227 Entering Passive Mode ({},{},{})", host, p >> 8, p & 0xff)
            }
            "EPSV" if epsv => {
                let data = TcpListener::bind((local_ip, 0))?;
                let p = data.local_addr()?.port();
                passive = Some(data);
                format!("229 Entering Extended Passive Mode (|||{}|)", p)
            }
            "NLST" => {
                let Some(data) = passive.take() else {
                    send(&mut w, charset, "425 Use PASV first")?;
                    continue;
                };
                match s.list() {
                    Ok(names) => {
                        send(&mut w, charset, "150 Here comes the listing")?;
                        let (mut conn, _) = data.accept()?;
                        for name in names {
                            conn.write_all(&charset.encode(&name).unwrap_or_default())?;
                            conn.write_all(b"\r\n")?;
                        }
                        drop(conn);
                        "226 Transfer complete".to_string()
                    }
                    Err(e) => failure(&e),
                }
            }
            "STOR" => {
                let Some(data) = passive.take() else {
                    send(&mut w, charset, "425 Use PASV first")?;
                    continue;
                };
                send(&mut w, charset, "150 Ok to send data")?;
                let (mut conn, _) = data.accept()?;
                let mut bytes = Vec::new();
                conn.read_to_end(&mut bytes)?;
                match s.store(&arg, &mut bytes.as_slice()) {
                    Ok(_) => "226 Transfer complete".to_string(),
                    Err(e) => failure(&e),
                }
            }
            "DELE" => match s.delete(&arg) {
                Ok(()) => "250 Deleted".to_string(),
                Err(e) => failure(&e),
            },
            "RMD" => match s.remove_directory(&arg) {
                Ok(()) => "250 Directory removed".to_string(),
                Err(e) => failure(&e),
            },
            "MKD" => match s.make_directory(&arg) {
                Ok(()) => format!("257 \"{}\" created", arg),
                Err(e) => failure(&e),
            },
            _ => "502 Command not implemented".to_string(),
        };
        send(&mut w, charset, &reply)?;
    }
}
