//! RESP protocol framing.
//!
//! Requests arrive either as RESP arrays of bulk strings (what real clients
//! send) or as inline space-separated lines (telnet convenience):
//!
//! ```text
//! *3\r\n$3\r\nPUT\r\n$3\r\nfoo\r\n$3\r\nbar\r\n
//! PUT foo bar\r\n
//! ```
//!
//! Both decode to the same `Vec<Vec<u8>>` argument list. Replies use the
//! standard RESP type prefixes: `+` simple string, `-` error, `:` integer,
//! `$` bulk string (`$-1` nil), `*` array.

use std::io::{self, BufRead, Read, Write};
use thiserror::Error;

/// Largest accepted bulk string, matching the engine's value size cap.
const MAX_BULK_LEN: i64 = 256 * 1024 * 1024;

/// Largest accepted argument count per command.
const MAX_ARGS: i64 = 64;

/// Errors from reading client input.
#[derive(Debug, Error)]
pub enum RespError {
    /// An underlying I/O error (including read timeouts).
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The client sent bytes that do not frame a command.
    #[error("{0}")]
    Protocol(String),
}

fn protocol(msg: impl Into<String>) -> RespError {
    RespError::Protocol(msg.into())
}

// -------------------------------------------------------------------------
// Request parsing
// -------------------------------------------------------------------------

/// Reads one command from the client.
///
/// Returns `Ok(None)` when the connection closed cleanly at a frame
/// boundary. An empty inline line yields an empty argument list, which the
/// caller should skip.
pub fn read_command<R: BufRead>(r: &mut R) -> Result<Option<Vec<Vec<u8>>>, RespError> {
    let line = match read_line(r)? {
        Some(line) => line,
        None => return Ok(None),
    };

    if let Some(rest) = line.strip_prefix(b"*") {
        let count = parse_int(rest)?;
        if !(0..=MAX_ARGS).contains(&count) {
            return Err(protocol(format!("invalid multibulk length {}", count)));
        }

        let mut args = Vec::with_capacity(count as usize);
        for _ in 0..count {
            args.push(read_bulk(r)?);
        }
        Ok(Some(args))
    } else {
        let args = line
            .split(|&b| b == b' ' || b == b'\t')
            .filter(|word| !word.is_empty())
            .map(|word| word.to_vec())
            .collect();
        Ok(Some(args))
    }
}

/// Reads one `$<len>\r\n<bytes>\r\n` bulk string.
fn read_bulk<R: BufRead>(r: &mut R) -> Result<Vec<u8>, RespError> {
    let header = read_line(r)?.ok_or_else(|| protocol("unexpected end of stream"))?;
    let len_bytes = header
        .strip_prefix(b"$")
        .ok_or_else(|| protocol("expected bulk string"))?;
    let len = parse_int(len_bytes)?;
    if !(0..=MAX_BULK_LEN).contains(&len) {
        return Err(protocol(format!("invalid bulk length {}", len)));
    }

    // payload plus the trailing CRLF
    let mut buf = vec![0u8; len as usize + 2];
    r.read_exact(&mut buf)?;
    if &buf[len as usize..] != b"\r\n" {
        return Err(protocol("bulk string missing CRLF terminator"));
    }
    buf.truncate(len as usize);
    Ok(buf)
}

/// Reads a CRLF-terminated line, without the terminator. `Ok(None)` is a
/// clean EOF before any bytes.
fn read_line<R: BufRead>(r: &mut R) -> Result<Option<Vec<u8>>, RespError> {
    let mut line = Vec::new();
    let n = r.read_until(b'\n', &mut line)?;
    if n == 0 {
        return Ok(None);
    }
    if line.last() != Some(&b'\n') {
        return Err(protocol("truncated line"));
    }
    line.pop();
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    Ok(Some(line))
}

fn parse_int(bytes: &[u8]) -> Result<i64, RespError> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .ok_or_else(|| protocol("invalid length"))
}

// -------------------------------------------------------------------------
// Reply writers
// -------------------------------------------------------------------------

pub fn write_simple<W: Write>(w: &mut W, s: &str) -> io::Result<()> {
    write!(w, "+{}\r\n", s)
}

/// Writes an error reply. `msg` should already carry the `ERR ` prefix;
/// embedded line breaks are flattened so the frame stays intact.
pub fn write_error<W: Write>(w: &mut W, msg: &str) -> io::Result<()> {
    let flat: String = msg
        .chars()
        .map(|c| if c == '\r' || c == '\n' { ' ' } else { c })
        .collect();
    write!(w, "-{}\r\n", flat)
}

pub fn write_integer<W: Write>(w: &mut W, n: i64) -> io::Result<()> {
    write!(w, ":{}\r\n", n)
}

pub fn write_bulk<W: Write>(w: &mut W, bytes: &[u8]) -> io::Result<()> {
    write!(w, "${}\r\n", bytes.len())?;
    w.write_all(bytes)?;
    w.write_all(b"\r\n")
}

/// The nil reply (`$-1`), returned for a `GET` miss.
pub fn write_null_bulk<W: Write>(w: &mut W) -> io::Result<()> {
    w.write_all(b"$-1\r\n")
}

pub fn write_array<W: Write>(w: &mut W, items: &[Vec<u8>]) -> io::Result<()> {
    write!(w, "*{}\r\n", items.len())?;
    for item in items {
        write_bulk(w, item)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn parse(data: &[u8]) -> Result<Option<Vec<Vec<u8>>>, RespError> {
        read_command(&mut Cursor::new(data.to_vec()))
    }

    #[test]
    fn array_command() {
        let args = parse(b"*3\r\n$3\r\nPUT\r\n$3\r\nfoo\r\n$3\r\nbar\r\n")
            .unwrap()
            .unwrap();
        assert_eq!(args, vec![b"PUT".to_vec(), b"foo".to_vec(), b"bar".to_vec()]);
    }

    #[test]
    fn inline_command() {
        let args = parse(b"GET  foo\r\n").unwrap().unwrap();
        assert_eq!(args, vec![b"GET".to_vec(), b"foo".to_vec()]);
    }

    #[test]
    fn inline_bare_newline() {
        let args = parse(b"KEYS\n").unwrap().unwrap();
        assert_eq!(args, vec![b"KEYS".to_vec()]);
    }

    #[test]
    fn empty_bulk_argument() {
        let args = parse(b"*2\r\n$3\r\nPUT\r\n$0\r\n\r\n").unwrap().unwrap();
        assert_eq!(args, vec![b"PUT".to_vec(), Vec::new()]);
    }

    #[test]
    fn binary_bulk_argument() {
        let args = parse(b"*1\r\n$3\r\n\x00\xFF\x80\r\n").unwrap().unwrap();
        assert_eq!(args, vec![vec![0x00u8, 0xFF, 0x80]]);
    }

    #[test]
    fn clean_eof_is_none() {
        assert!(parse(b"").unwrap().is_none());
    }

    #[test]
    fn empty_inline_line_is_empty_args() {
        let args = parse(b"\r\n").unwrap().unwrap();
        assert!(args.is_empty());
    }

    #[test]
    fn truncated_array_is_protocol_error() {
        assert!(matches!(
            parse(b"*2\r\n$3\r\nGET\r\n"),
            Err(RespError::Protocol(_))
        ));
    }

    #[test]
    fn bulk_without_terminator_is_protocol_error() {
        assert!(matches!(
            parse(b"*1\r\n$3\r\nfooXX"),
            Err(RespError::Protocol(_))
        ));
    }

    #[test]
    fn negative_bulk_length_is_protocol_error() {
        assert!(matches!(
            parse(b"*1\r\n$-1\r\n"),
            Err(RespError::Protocol(_))
        ));
    }

    #[test]
    fn non_numeric_length_is_protocol_error() {
        assert!(matches!(parse(b"*x\r\n"), Err(RespError::Protocol(_))));
    }

    #[test]
    fn reply_writers_frame_correctly() {
        let mut out = Vec::new();
        write_simple(&mut out, "OK").unwrap();
        write_error(&mut out, "ERR boom").unwrap();
        write_integer(&mut out, 1).unwrap();
        write_bulk(&mut out, b"bar").unwrap();
        write_null_bulk(&mut out).unwrap();
        write_array(&mut out, &[b"a".to_vec(), b"b".to_vec()]).unwrap();

        assert_eq!(
            out,
            b"+OK\r\n-ERR boom\r\n:1\r\n$3\r\nbar\r\n$-1\r\n*2\r\n$1\r\na\r\n$1\r\nb\r\n"
        );
    }

    #[test]
    fn error_writer_flattens_line_breaks() {
        let mut out = Vec::new();
        write_error(&mut out, "ERR two\r\nlines").unwrap();
        assert_eq!(out, b"-ERR two  lines\r\n");
    }
}
