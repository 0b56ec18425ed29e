use crate::codec::types::MessageType;

/// Everything that can go wrong while framing or unframing a message.
///
/// Errors are terminal for the call that produced them: a decode that fails
/// leaves the stream at an unknown offset, so callers usually drop the
/// connection.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("bad message type {0}")]
    BadMessageType(u8),
    #[error("bad qos level {0}")]
    BadQosLevel(u8),
    #[error("bad return code {0}")]
    BadReturnCode(u8),
    #[error("{message_type:?} message too long: {length} bytes exceeds {max}")]
    MessageTooLong {
        message_type: MessageType,
        length: u32,
        max: u32,
    },
    #[error("message length doesn't match its content")]
    WrongLength,
    #[error("variable length integer longer than 4 bytes")]
    MalformedVarint,
    #[error("value {0} cannot be encoded as a variable length integer")]
    VarintOutOfRange(u64),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
