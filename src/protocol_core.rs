//! Core FTP wire helpers shared by the session and the tests
//!
//! Everything here is pure: reply framing, PASV/PWD parsing, and command
//! encoding in the session charset. No sockets are touched.

use encoding_rs::Encoding;
use std::fmt;
use std::io::{self, BufRead, Read};
use std::net::{Ipv4Addr, SocketAddrV4};

use crate::error::{ConfigError, SessionError};
use crate::protocol::MAX_REPLY_LINE;

/// A complete (possibly multi-line) server reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub text: String,
}

impl Reply {
    pub fn new(code: u16, text: impl Into<String>) -> Self {
        Self {
            code,
            text: text.into(),
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.text)
    }
}

/// Character set used for names on the control and NLST channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Charset(&'static Encoding);

impl Charset {
    pub fn utf8() -> Self {
        Charset(encoding_rs::UTF_8)
    }

    /// Resolve a WHATWG label such as `utf-8`, `gbk` or `latin1`
    pub fn for_label(label: &str) -> Result<Self, ConfigError> {
        Encoding::for_label(label.trim().as_bytes())
            .map(Charset)
            .ok_or_else(|| ConfigError::UnknownEncoding(label.to_string()))
    }

    pub fn name(&self) -> &'static str {
        self.0.name()
    }

    pub fn encode(&self, s: &str) -> Result<Vec<u8>, SessionError> {
        let (bytes, _, had_errors) = self.0.encode(s);
        if had_errors {
            return Err(SessionError::Encoding(s.to_string()));
        }
        Ok(bytes.into_owned())
    }

    pub fn decode(&self, bytes: &[u8]) -> String {
        self.0.decode_without_bom_handling(bytes).0.into_owned()
    }
}

impl Default for Charset {
    fn default() -> Self {
        Self::utf8()
    }
}

/// Build `VERB[ arg]\r\n` in the given charset.
pub fn build_command(verb: &str, arg: Option<&str>, charset: Charset) -> Result<Vec<u8>, SessionError> {
    let mut line = Vec::with_capacity(verb.len() + 2 + arg.map_or(0, str::len));
    line.extend_from_slice(verb.as_bytes());
    if let Some(arg) = arg {
        // A CR or LF inside a name would smuggle a second command
        if arg.contains(['\r', '\n']) {
            return Err(SessionError::Encoding(arg.to_string()));
        }
        line.push(b' ');
        line.extend_from_slice(&charset.encode(arg)?);
    }
    line.extend_from_slice(b"\r\n");
    Ok(line)
}

fn read_line<R: BufRead>(reader: &mut R, charset: Charset) -> Result<String, SessionError> {
    let mut buf = Vec::with_capacity(128);
    let n = reader
        .by_ref()
        .take(MAX_REPLY_LINE as u64)
        .read_until(b'\n', &mut buf)?;
    if n == 0 {
        return Err(SessionError::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "server closed the control connection",
        )));
    }
    if buf.last() != Some(&b'\n') {
        return Err(SessionError::Malformed(format!(
            "reply line exceeds {} bytes",
            MAX_REPLY_LINE
        )));
    }
    while matches!(buf.last(), Some(b'\n' | b'\r')) {
        buf.pop();
    }
    Ok(charset.decode(&buf))
}

fn split_status(line: &str) -> Result<(u16, bool, &str), SessionError> {
    let digits = line
        .get(..3)
        .filter(|d| d.bytes().all(|b| b.is_ascii_digit()))
        .ok_or_else(|| SessionError::Malformed(line.to_string()))?;
    let code: u16 = digits
        .parse()
        .map_err(|_| SessionError::Malformed(line.to_string()))?;
    match line.as_bytes().get(3) {
        None => Ok((code, false, "")),
        Some(b' ') => Ok((code, false, line.get(4..).unwrap_or(""))),
        Some(b'-') => Ok((code, true, line.get(4..).unwrap_or(""))),
        Some(_) => Err(SessionError::Malformed(line.to_string())),
    }
}

/// Read one reply, joining continuation lines of a `123-` multi-line reply.
pub fn read_reply<R: BufRead>(reader: &mut R, charset: Charset) -> Result<Reply, SessionError> {
    let first = read_line(reader, charset)?;
    let (code, multiline, rest) = split_status(&first)?;
    let mut text = rest.to_string();
    if multiline {
        let terminator = format!("{:03} ", code);
        loop {
            let line = read_line(reader, charset)?;
            text.push('\n');
            if let Some(last) = line.strip_prefix(&terminator) {
                text.push_str(last);
                break;
            }
            if line == terminator.trim_end() {
                break;
            }
            text.push_str(&line);
        }
    }
    Ok(Reply { code, text })
}

/// Extract the data address from a `227 Entering Passive Mode (h1,h2,h3,h4,p1,p2)` reply
pub fn parse_pasv(text: &str) -> Result<SocketAddrV4, SessionError> {
    text.split(|c: char| !(c.is_ascii_digit() || c == ','))
        .find_map(|tok| {
            let parts: Vec<u8> = tok
                .split(',')
                .map(|p| p.parse().ok())
                .collect::<Option<_>>()?;
            if parts.len() != 6 {
                return None;
            }
            let ip = Ipv4Addr::new(parts[0], parts[1], parts[2], parts[3]);
            let port = (u16::from(parts[4]) << 8) | u16::from(parts[5]);
            Some(SocketAddrV4::new(ip, port))
        })
        .ok_or_else(|| SessionError::Malformed(format!("227 {}", text)))
}

/// Extract the data port from `229 Entering Extended Passive Mode (|||6446|)`.
///
/// The delimiter is whatever character follows the parenthesis; the address
/// fields are always empty and the host is the control connection's peer.
pub fn parse_epsv(text: &str) -> Result<u16, SessionError> {
    let malformed = || SessionError::Malformed(format!("229 {}", text));
    let start = text.find('(').ok_or_else(malformed)?;
    let inner = &text[start + 1..];
    let inner = &inner[..inner.find(')').ok_or_else(malformed)?];
    let delim = inner.chars().next().ok_or_else(malformed)?;
    match inner.split(delim).collect::<Vec<_>>().as_slice() {
        ["", "", "", port, ""] => port
            .parse::<u16>()
            .ok()
            .filter(|p| *p != 0)
            .ok_or_else(malformed),
        _ => Err(malformed()),
    }
}

/// Extract the directory from `257 "/some ""quoted"" dir" is current directory`
pub fn parse_pwd(text: &str) -> Result<String, SessionError> {
    let malformed = || SessionError::Malformed(format!("257 {}", text));
    let start = text.find('"').ok_or_else(malformed)?;
    let mut out = String::new();
    let mut chars = text[start + 1..].chars().peekable();
    while let Some(c) = chars.next() {
        if c == '"' {
            if chars.peek() == Some(&'"') {
                chars.next();
                out.push('"');
                continue;
            }
            return Ok(out);
        }
        out.push(c);
    }
    Err(malformed())
}

/// Final path component of an NLST line. Some servers answer `NLST` with
/// `dir/name` rather than `name`.
pub fn entry_name(line: &str) -> Option<&str> {
    let trimmed = line.trim_end_matches(['\r', '\n']).trim_end_matches('/');
    let name = trimmed.rsplit('/').next().unwrap_or(trimmed);
    match name {
        "" | "." | ".." => None,
        n => Some(n),
    }
}

/// Entry names of an NLST body, at most `limit` of them. The flag is set
/// when the listing held more names than that.
pub fn listing_names(listing: &str, limit: usize) -> (Vec<String>, bool) {
    let mut names: Vec<String> = listing
        .lines()
        .filter_map(entry_name)
        .take(limit.saturating_add(1))
        .map(str::to_string)
        .collect();
    let truncated = names.len() > limit;
    names.truncate(limit);
    (names, truncated)
}
