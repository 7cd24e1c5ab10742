//! Wire protocol: the `CMD#ARG` request grammar and response formatting.
//!
//! This module is deliberately dependency-free (no I/O) so both the request
//! server and its test suite parse/format against the exact same grammar.

use crate::consts::{COMMAND_DELIMITER, DESCRIPTOR_DELIMITER};
use std::fmt;

/// A parsed client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// `REQUEST#<id>` — admission.
    Request {
        /// Dataset identifier.
        id: String,
    },
    /// `CHECK#<id>` — poll.
    Check {
        /// Dataset identifier.
        id: String,
    },
    /// `COMPLETE#<id>` — release one pin.
    Complete {
        /// Dataset identifier.
        id: String,
    },
}

impl Request {
    /// The dataset identifier this request names.
    pub fn id(&self) -> &str {
        match self {
            Request::Request { id } | Request::Check { id } | Request::Complete { id } => id,
        }
    }
}

/// Error parsing a raw request line.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// The line had no `#` delimiter, an unknown command, or an empty id.
    #[error("malformed request: {0:?}")]
    Malformed(String),

    /// The identifier contained a reserved delimiter character.
    #[error("identifier contains a reserved delimiter: {0:?}")]
    ReservedDelimiter(String),
}

/// Parse a single trimmed request line into a [`Request`].
///
/// Framing (reading up to the first newline or end-of-stream, and trimming)
/// is the caller's (request server's) responsibility; this function assumes
/// it has already been done.
pub fn parse_request(line: &str) -> Result<Request, ParseError> {
    let (cmd, id) = line
        .split_once(COMMAND_DELIMITER)
        .ok_or_else(|| ParseError::Malformed(line.to_string()))?;

    if id.is_empty() {
        return Err(ParseError::Malformed(line.to_string()));
    }
    if id.contains(COMMAND_DELIMITER) || id.contains(DESCRIPTOR_DELIMITER) {
        return Err(ParseError::ReservedDelimiter(id.to_string()));
    }

    match cmd {
        "REQUEST" => Ok(Request::Request { id: id.to_string() }),
        "CHECK" => Ok(Request::Check { id: id.to_string() }),
        "COMPLETE" => Ok(Request::Complete { id: id.to_string() }),
        _ => Err(ParseError::Malformed(line.to_string())),
    }
}

/// Element shape: an ordered tuple of positive dimensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shape(pub Vec<u64>);

impl fmt::Display for Shape {
    /// Render as the literal form `(d1,d2,...,dn)` — this exact syntax
    /// must be preserved so existing clients parse it.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, dim) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{dim}")?;
        }
        write!(f, ")")
    }
}

/// A published dataset descriptor, sufficient for a client to attach and
/// decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    /// OS shared-memory segment name.
    pub segment_name: String,
    /// Element shape.
    pub shape: Shape,
    /// Element type tag (e.g. `float64`, `int32`, `object`).
    pub dtype: String,
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{DESCRIPTOR_DELIMITER}{}{DESCRIPTOR_DELIMITER}{}",
            self.segment_name, self.shape, self.dtype
        )
    }
}

/// A server response. `Ready`/`Ack`/`Wait`/`Invalid` map onto the raw wire
/// strings with no terminator required.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Success descriptor for a resident dataset.
    Ready(Descriptor),
    /// Not yet resident; client should poll via `CHECK`.
    Wait,
    /// Acknowledgment of `COMPLETE`.
    Ack,
    /// Malformed command, unknown command, or `COMPLETE`/`CHECK` for a
    /// nonexistent identifier.
    Invalid,
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Ready(descriptor) => write!(f, "{descriptor}"),
            Response::Wait => write!(f, "WAIT"),
            Response::Ack => write!(f, "ACK"),
            Response::Invalid => write!(f, "INVALID_REQUEST"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_request_check_complete() {
        assert_eq!(
            parse_request("REQUEST#2024-01-01_trades").unwrap(),
            Request::Request {
                id: "2024-01-01_trades".to_string()
            }
        );
        assert_eq!(
            parse_request("CHECK#abc").unwrap(),
            Request::Check {
                id: "abc".to_string()
            }
        );
        assert_eq!(
            parse_request("COMPLETE#abc").unwrap(),
            Request::Complete {
                id: "abc".to_string()
            }
        );
    }

    #[test]
    fn rejects_unknown_command() {
        assert!(matches!(
            parse_request("FOO#bar"),
            Err(ParseError::Malformed(_))
        ));
    }

    #[test]
    fn rejects_missing_delimiter() {
        assert!(matches!(
            parse_request("REQUEST"),
            Err(ParseError::Malformed(_))
        ));
    }

    #[test]
    fn rejects_empty_id() {
        assert!(matches!(
            parse_request("REQUEST#"),
            Err(ParseError::Malformed(_))
        ));
    }

    #[test]
    fn rejects_id_with_reserved_delimiter() {
        assert!(matches!(
            parse_request("REQUEST#a|b"),
            Err(ParseError::ReservedDelimiter(_))
        ));
        assert!(matches!(
            parse_request("REQUEST#a#b"),
            Err(ParseError::ReservedDelimiter(_))
        ));
    }

    #[test]
    fn formats_shape_literal() {
        assert_eq!(Shape(vec![10, 4]).to_string(), "(10,4)");
        assert_eq!(Shape(vec![1]).to_string(), "(1)");
        assert_eq!(Shape(vec![]).to_string(), "()");
    }

    #[test]
    fn formats_descriptor() {
        let descriptor = Descriptor {
            segment_name: "/shm_2024-01-01_trades".to_string(),
            shape: Shape(vec![100, 8]),
            dtype: "float64".to_string(),
        };
        assert_eq!(
            descriptor.to_string(),
            "/shm_2024-01-01_trades|(100,8)|float64"
        );
    }

    #[test]
    fn formats_responses() {
        assert_eq!(Response::Wait.to_string(), "WAIT");
        assert_eq!(Response::Ack.to_string(), "ACK");
        assert_eq!(Response::Invalid.to_string(), "INVALID_REQUEST");
    }
}
