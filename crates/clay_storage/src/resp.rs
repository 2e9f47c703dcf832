//! RESP2 codec
//!
//! Encoding of commands and decoding of replies for the Redis
//! serialization protocol, version 2.
//!
//! ## Wire Format
//!
//! ### Request
//! Every command is sent as an array of bulk strings:
//! ```text
//! *<argc>\r\n
//! $<len>\r\n<arg bytes>\r\n      (repeated argc times)
//! ```
//!
//! ### Reply
//! ```text
//! +<status>\r\n                  simple string
//! -<message>\r\n                 error
//! :<integer>\r\n                 integer
//! $<len>\r\n<bytes>\r\n          bulk string ($-1 is nil)
//! *<count>\r\n<replies...>       array (*-1 is nil)
//! ```

use crate::error::{StorageError, StorageResult};
use std::io::{BufRead, Write};

/// Maximum bulk string size accepted from a server (512 MB).
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum nesting depth accepted for array replies.
const MAX_DEPTH: usize = 8;

/// A decoded server reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `+OK` style status line.
    Status(String),
    /// `-ERR ...` style error line.
    Error(String),
    /// `:<n>` integer.
    Integer(i64),
    /// `$<len>` bulk string, `None` for nil.
    Bulk(Option<Vec<u8>>),
    /// `*<count>` array, `None` for nil.
    Array(Option<Vec<Reply>>),
}

impl Reply {
    /// Turns error replies into [`StorageError::Backend`].
    pub fn into_result(self) -> StorageResult<Self> {
        match self {
            Self::Error(message) => Err(StorageError::Backend(message)),
            other => Ok(other),
        }
    }

    /// Expects an integer reply.
    pub fn into_integer(self) -> StorageResult<i64> {
        match self.into_result()? {
            Self::Integer(n) => Ok(n),
            other => Err(unexpected("integer", &other)),
        }
    }

    /// Expects a bulk string reply, decoded as UTF-8.
    pub fn into_string(self) -> StorageResult<Option<String>> {
        match self.into_result()? {
            Self::Bulk(None) => Ok(None),
            Self::Bulk(Some(bytes)) => utf8(bytes).map(Some),
            Self::Status(status) => Ok(Some(status)),
            other => Err(unexpected("bulk string", &other)),
        }
    }

    /// Expects an array of bulk strings. A nil array is empty.
    pub fn into_strings(self) -> StorageResult<Vec<String>> {
        match self.into_result()? {
            Self::Array(None) => Ok(Vec::new()),
            Self::Array(Some(items)) => items
                .into_iter()
                .map(|item| {
                    item.into_string()?
                        .ok_or_else(|| StorageError::protocol("nil element in array reply"))
                })
                .collect(),
            other => Err(unexpected("array", &other)),
        }
    }

    /// Expects a `+OK` status reply.
    pub fn into_ok(self) -> StorageResult<()> {
        match self.into_result()? {
            Self::Status(status) if status == "OK" => Ok(()),
            other => Err(unexpected("OK", &other)),
        }
    }
}

fn unexpected(expected: &str, got: &Reply) -> StorageError {
    StorageError::protocol(format!("expected {expected} reply, got {got:?}"))
}

fn utf8(bytes: Vec<u8>) -> StorageResult<String> {
    String::from_utf8(bytes).map_err(|e| StorageError::protocol(format!("invalid UTF-8: {e}")))
}

// =============================================================================
// Command Encoding
// =============================================================================

/// Encodes a command as a RESP array of bulk strings.
#[must_use]
pub fn encode_command<A: AsRef<[u8]>>(args: &[A]) -> Vec<u8> {
    let payload: usize = args.iter().map(|a| a.as_ref().len() + 16).sum();
    let mut message = Vec::with_capacity(16 + payload);
    message.extend_from_slice(format!("*{}\r\n", args.len()).as_bytes());
    for arg in args {
        let arg = arg.as_ref();
        message.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
        message.extend_from_slice(arg);
        message.extend_from_slice(b"\r\n");
    }
    message
}

/// Writes a command to `writer` and flushes it.
pub fn write_command<W: Write, A: AsRef<[u8]>>(writer: &mut W, args: &[A]) -> StorageResult<()> {
    writer.write_all(&encode_command(args))?;
    writer.flush()?;
    Ok(())
}

// =============================================================================
// Reply Decoding
// =============================================================================

/// Reads one complete reply from `reader`.
///
/// # Errors
///
/// Returns [`StorageError::Io`] if the stream fails or ends early and
/// [`StorageError::Protocol`] if the bytes are not valid RESP2.
pub fn read_reply<R: BufRead>(reader: &mut R) -> StorageResult<Reply> {
    read_reply_at(reader, 0)
}

/// Decodes one reply from a byte slice.
///
/// Returns the reply and the number of bytes consumed.
pub fn decode_reply(bytes: &[u8]) -> StorageResult<(Reply, usize)> {
    let mut cursor = bytes;
    let reply = read_reply(&mut cursor)?;
    Ok((reply, bytes.len() - cursor.len()))
}

fn read_reply_at<R: BufRead>(reader: &mut R, depth: usize) -> StorageResult<Reply> {
    if depth > MAX_DEPTH {
        return Err(StorageError::protocol("array reply nested too deeply"));
    }

    let line = read_line(reader)?;
    let (marker, body) = line
        .split_first()
        .ok_or_else(|| StorageError::protocol("empty reply line"))?;

    match marker {
        b'+' => Ok(Reply::Status(utf8(body.to_vec())?)),
        b'-' => Ok(Reply::Error(utf8(body.to_vec())?)),
        b':' => parse_integer(body).map(Reply::Integer),
        b'$' => {
            let len = parse_integer(body)?;
            if len < 0 {
                return Ok(Reply::Bulk(None));
            }
            let len = usize::try_from(len)
                .map_err(|_| StorageError::protocol("bulk length out of range"))?;
            if len > MAX_BULK_SIZE {
                return Err(StorageError::protocol(format!(
                    "bulk string too large: {len} bytes (max {MAX_BULK_SIZE})"
                )));
            }
            let mut data = vec![0u8; len + 2];
            reader.read_exact(&mut data)?;
            if !data.ends_with(b"\r\n") {
                return Err(StorageError::protocol("bulk string not terminated by CRLF"));
            }
            data.truncate(len);
            Ok(Reply::Bulk(Some(data)))
        }
        b'*' => {
            let count = parse_integer(body)?;
            if count < 0 {
                return Ok(Reply::Array(None));
            }
            let count = usize::try_from(count)
                .map_err(|_| StorageError::protocol("array length out of range"))?;
            let mut items = Vec::with_capacity(count.min(1024));
            for _ in 0..count {
                items.push(read_reply_at(reader, depth + 1)?);
            }
            Ok(Reply::Array(Some(items)))
        }
        other => Err(StorageError::protocol(format!(
            "unknown reply type: 0x{other:02x}"
        ))),
    }
}

/// Reads a CRLF-terminated line, without the terminator.
fn read_line<R: BufRead>(reader: &mut R) -> StorageResult<Vec<u8>> {
    let mut line = Vec::new();
    let read = reader.read_until(b'\n', &mut line)?;
    if read == 0 {
        return Err(StorageError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "connection closed while waiting for a reply",
        )));
    }
    if !line.ends_with(b"\r\n") {
        return Err(StorageError::protocol("reply line not terminated by CRLF"));
    }
    line.truncate(line.len() - 2);
    Ok(line)
}

fn parse_integer(body: &[u8]) -> StorageResult<i64> {
    std::str::from_utf8(body)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| {
            StorageError::protocol(format!(
                "invalid integer: {:?}",
                String::from_utf8_lossy(body)
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_command_format() {
        let encoded = encode_command(&["SET", "clay:User:id", "1"]);
        assert_eq!(
            encoded,
            b"*3\r\n$3\r\nSET\r\n$12\r\nclay:User:id\r\n$1\r\n1\r\n".to_vec()
        );
    }

    #[test]
    fn encode_command_binary_safe() {
        let encoded = encode_command(&[b"SET".as_slice(), b"k", b"a\r\nb"]);
        assert!(encoded.ends_with(b"$4\r\na\r\nb\r\n"));
    }

    #[test]
    fn write_command_flushes_bytes() {
        let mut out = Vec::new();
        write_command(&mut out, &["PING"]).unwrap();
        assert_eq!(out, b"*1\r\n$4\r\nPING\r\n");
    }

    #[test]
    fn decode_simple_replies() {
        assert_eq!(
            decode_reply(b"+OK\r\n").unwrap(),
            (Reply::Status("OK".into()), 5)
        );
        assert_eq!(
            decode_reply(b"-ERR wrong\r\n").unwrap().0,
            Reply::Error("ERR wrong".into())
        );
        assert_eq!(decode_reply(b":42\r\n").unwrap().0, Reply::Integer(42));
        assert_eq!(decode_reply(b":-3\r\n").unwrap().0, Reply::Integer(-3));
    }

    #[test]
    fn decode_bulk_and_nil() {
        assert_eq!(
            decode_reply(b"$5\r\nhello\r\n").unwrap(),
            (Reply::Bulk(Some(b"hello".to_vec())), 11)
        );
        assert_eq!(decode_reply(b"$-1\r\n").unwrap().0, Reply::Bulk(None));
        assert_eq!(
            decode_reply(b"$0\r\n\r\n").unwrap().0,
            Reply::Bulk(Some(Vec::new()))
        );
    }

    #[test]
    fn decode_array_reply() {
        let bytes = b"*3\r\n$4\r\nname\r\n$-1\r\n:7\r\n";
        let (reply, used) = decode_reply(bytes).unwrap();
        assert_eq!(used, bytes.len());
        assert_eq!(
            reply,
            Reply::Array(Some(vec![
                Reply::Bulk(Some(b"name".to_vec())),
                Reply::Bulk(None),
                Reply::Integer(7),
            ]))
        );
        assert_eq!(decode_reply(b"*-1\r\n").unwrap().0, Reply::Array(None));
    }

    #[test]
    fn decode_consumes_only_one_reply() {
        let (reply, used) = decode_reply(b":1\r\n:2\r\n").unwrap();
        assert_eq!(reply, Reply::Integer(1));
        assert_eq!(used, 4);
    }

    #[test]
    fn decode_truncated_bulk_fails() {
        let result = decode_reply(b"$10\r\nshort\r\n");
        assert!(matches!(result, Err(StorageError::Io(_))));
    }

    #[test]
    fn decode_missing_crlf_fails() {
        assert!(matches!(
            decode_reply(b"+OK\n"),
            Err(StorageError::Protocol(_))
        ));
        assert!(matches!(
            decode_reply(b"$2\r\nabXY"),
            Err(StorageError::Protocol(_))
        ));
    }

    #[test]
    fn decode_unknown_marker_fails() {
        assert!(matches!(
            decode_reply(b"!oops\r\n"),
            Err(StorageError::Protocol(_))
        ));
    }

    #[test]
    fn decode_empty_input_is_eof() {
        match decode_reply(b"") {
            Err(StorageError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof),
            other => panic!("expected EOF, got {other:?}"),
        }
    }

    #[test]
    fn reply_conversions() {
        assert_eq!(Reply::Integer(3).into_integer().unwrap(), 3);
        assert_eq!(
            Reply::Bulk(Some(b"x".to_vec())).into_string().unwrap(),
            Some("x".to_string())
        );
        assert_eq!(Reply::Bulk(None).into_string().unwrap(), None);
        assert!(Reply::Status("OK".into()).into_ok().is_ok());
        assert_eq!(
            Reply::Array(Some(vec![Reply::Bulk(Some(b"a".to_vec()))]))
                .into_strings()
                .unwrap(),
            vec!["a".to_string()]
        );
        assert!(Reply::Array(None).into_strings().unwrap().is_empty());
    }

    #[test]
    fn error_reply_becomes_backend_error() {
        let err = Reply::Error("WRONGTYPE Operation against a key".into())
            .into_integer()
            .unwrap_err();
        assert!(matches!(err, StorageError::Backend(m) if m.starts_with("WRONGTYPE")));
    }

    #[test]
    fn mismatched_reply_is_protocol_error() {
        assert!(matches!(
            Reply::Status("OK".into()).into_integer(),
            Err(StorageError::Protocol(_))
        ));
    }
}
