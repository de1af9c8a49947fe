use thiserror::Error;

use crate::content::ContentId;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    #[error("invalid stream magic: expected 0xACED, got 0x{0:04X}")]
    InvalidMagic(u16),
    #[error("invalid stream version: expected 0x0005, got 0x{0:04X}")]
    InvalidVersion(u16),
    #[error("unknown content tag in stream: 0x{0:02X}")]
    UnknownTag(u8),
    #[error("block data is not allowed here: 0x{0:02X}")]
    UnexpectedBlockData(u8),
    #[error("no entry for handle 0x{0:X}")]
    UnboundHandle(u32),
    #[error("handle 0x{0:X} is already bound")]
    HandleRebound(u32),
    #[error("invalid field type code: 0x{0:02X}")]
    InvalidFieldType(u8),
    #[error("invalid length: {0}")]
    InvalidLength(i64),
    #[error("improperly-encoded null in modified UTF-8 string")]
    EncodedNull,
    #[error("invalid byte in modified UTF-8 string: 0x{0:02X}")]
    BadUtf8Byte(u8),
    #[error("modified UTF-8 continuation byte missing its 10 prefix: 0x{0:02X}")]
    BadUtf8Continuation(u8),
    #[error("unexpected end of modified UTF-8 sequence")]
    TruncatedUtf8,
    #[error("recording not active")]
    RecordingInactive,
    #[error("{0}")]
    Validity(String),
    /// Control-flow signal: an exception-flagged content surfaced in a
    /// nested read. Absorbed at the top-level record boundary and rendered
    /// as an exception-state content; never returned to callers.
    #[error("serialized exception read during stream")]
    ExceptionRead(ContentId),
}
