//! Error types for the server core.

use std::fmt::{Error, Formatter};

/// Errors that terminate a connection's request loop
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestError {
    /// I/O error on the underlying stream
    Io(std::io::ErrorKind),
    /// framing error on the stream, the connection cannot be recovered
    BadFrame(FrameParseError),
    /// request PDU could not be parsed
    BadRequest(AduParseError),
    /// a bug in the library prevented serializing a reply
    Internal(InternalError),
    /// no request arrived within the configured read deadline
    ReadTimeout,
    /// the server is shutting down
    Shutdown,
}

impl std::error::Error for RequestError {}

impl std::fmt::Display for RequestError {
    fn fmt(&self, f: &mut Formatter) -> Result<(), Error> {
        match self {
            RequestError::Io(kind) => write!(f, "i/o error: {kind}"),
            RequestError::BadFrame(err) => write!(f, "{err}"),
            RequestError::BadRequest(err) => write!(f, "{err}"),
            RequestError::Internal(err) => write!(f, "{err}"),
            RequestError::ReadTimeout => f.write_str("no request received within the read deadline"),
            RequestError::Shutdown => f.write_str("server is shutting down"),
        }
    }
}

impl From<std::io::Error> for RequestError {
    fn from(err: std::io::Error) -> Self {
        RequestError::Io(err.kind())
    }
}

impl From<FrameParseError> for RequestError {
    fn from(err: FrameParseError) -> Self {
        RequestError::BadFrame(err)
    }
}

impl From<AduParseError> for RequestError {
    fn from(err: AduParseError) -> Self {
        RequestError::BadRequest(err)
    }
}

impl From<InternalError> for RequestError {
    fn from(err: InternalError) -> Self {
        RequestError::Internal(err)
    }
}

/// Errors that occur while parsing an MBAP header off the stream
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameParseError {
    /// the protocol id field was not zero
    UnknownProtocolId(u16),
    /// the length field cannot describe a unit id and a function code
    MbapLengthTooSmall(usize),
    /// the length field exceeds the maximum allowed value
    FrameLengthTooBig(usize, usize),
}

impl std::error::Error for FrameParseError {}

impl std::fmt::Display for FrameParseError {
    fn fmt(&self, f: &mut Formatter) -> Result<(), Error> {
        match self {
            FrameParseError::UnknownProtocolId(id) => {
                write!(f, "received frame with non-Modbus protocol id: {id:#06X}")
            }
            FrameParseError::MbapLengthTooSmall(size) => {
                write!(f, "received frame with length field too small: {size}")
            }
            FrameParseError::FrameLengthTooBig(size, max) => {
                write!(
                    f,
                    "received frame with length ({size}) that exceeds max allowed size ({max})"
                )
            }
        }
    }
}

/// Errors that occur while parsing a request PDU
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AduParseError {
    /// request is too short to be valid
    InsufficientBytes,
    /// request contains extra trailing bytes
    TrailingBytes(usize),
    /// byte count doesn't match what is expected based on the quantity
    ByteCountMismatch(usize, usize),
    /// bad value for the coil state
    UnknownCoilState(u16),
    /// the address range is not valid
    InvalidRange(InvalidRange),
}

impl AduParseError {
    /// exception code reported to the client for this parse error
    pub(crate) fn exception(self) -> crate::exception::ExceptionCode {
        match self {
            AduParseError::InvalidRange(InvalidRange::AddressOverflow(_, _)) => {
                crate::exception::ExceptionCode::IllegalDataAddress
            }
            _ => crate::exception::ExceptionCode::IllegalDataValue,
        }
    }
}

impl std::error::Error for AduParseError {}

impl std::fmt::Display for AduParseError {
    fn fmt(&self, f: &mut Formatter) -> Result<(), Error> {
        match self {
            AduParseError::InsufficientBytes => f.write_str("request is too short to be valid"),
            AduParseError::TrailingBytes(remaining) => {
                write!(f, "request contains {remaining} extra trailing bytes")
            }
            AduParseError::ByteCountMismatch(expected, actual) => write!(
                f,
                "byte count ({actual}) doesn't match what is expected based on the quantity ({expected})"
            ),
            AduParseError::UnknownCoilState(value) => write!(
                f,
                "received coil state with unspecified value: {value:#06X}"
            ),
            AduParseError::InvalidRange(err) => write!(f, "{err}"),
        }
    }
}

impl From<InvalidRange> for AduParseError {
    fn from(err: InvalidRange) -> Self {
        AduParseError::InvalidRange(err)
    }
}

/// Errors that describe an invalid address range
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvalidRange {
    /// range contains a count of zero
    CountOfZero,
    /// start and count would overflow the u16 address space
    AddressOverflow(u16, u16),
    /// the count exceeds the maximum allowed for this request type
    CountTooLargeForType(u16, u16),
}

impl std::error::Error for InvalidRange {}

impl std::fmt::Display for InvalidRange {
    fn fmt(&self, f: &mut Formatter) -> Result<(), Error> {
        match self {
            InvalidRange::CountOfZero => f.write_str("range contains a count of zero"),
            InvalidRange::AddressOverflow(start, count) => write!(
                f,
                "start == {start} and count == {count} would overflow the representation of u16"
            ),
            InvalidRange::CountTooLargeForType(count, max) => write!(
                f,
                "the count of {count} exceeds the maximum allowed count of {max} for this type"
            ),
        }
    }
}

/// Errors that can only be caused by a bug in the library itself
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InternalError {
    /// attempted to read more bytes than present
    InsufficientBytesForRead(usize, usize),
    /// attempted to write more bytes than allowed
    InsufficientWriteSpace(usize, usize),
    /// cursor seek operation exceeded the bounds of the underlying buffer
    BadSeekOperation,
    /// the byte count would exceed the maximum size of a u8
    BadByteCount(usize),
}

impl std::error::Error for InternalError {}

impl std::fmt::Display for InternalError {
    fn fmt(&self, f: &mut Formatter) -> Result<(), Error> {
        match self {
            InternalError::InsufficientBytesForRead(requested, remaining) => write!(
                f,
                "attempted to read {requested} bytes with only {remaining} remaining"
            ),
            InternalError::InsufficientWriteSpace(requested, remaining) => write!(
                f,
                "attempted to write {requested} bytes with {remaining} bytes remaining"
            ),
            InternalError::BadSeekOperation => {
                f.write_str("cursor seek operation exceeded the bounds of the underlying buffer")
            }
            InternalError::BadByteCount(count) => {
                write!(f, "byte count would exceed maximum size of u8: {count}")
            }
        }
    }
}

/// Errors returned when validating server options
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// the maximum client count must be at least one
    MaxClientsZero,
    /// the read deadline, when configured, must be at least 60 seconds
    ReadTimeoutTooShort(std::time::Duration),
}

impl std::error::Error for ConfigError {}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut Formatter) -> Result<(), Error> {
        match self {
            ConfigError::MaxClientsZero => {
                f.write_str("the maximum client count must be at least one")
            }
            ConfigError::ReadTimeoutTooShort(value) => write!(
                f,
                "the read deadline must be at least 60 seconds, got {value:?}"
            ),
        }
    }
}

/// Errors returned by [`crate::server::Server::start`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartError {
    /// the server was already started
    AlreadyStarted,
    /// the server was already stopped and cannot be restarted
    Stopped,
}

impl std::error::Error for StartError {}

impl std::fmt::Display for StartError {
    fn fmt(&self, f: &mut Formatter) -> Result<(), Error> {
        match self {
            StartError::AlreadyStarted => f.write_str("the server was already started"),
            StartError::Stopped => f.write_str("the server was stopped and cannot be restarted"),
        }
    }
}
