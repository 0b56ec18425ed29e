//! Wire codec for MQTT-family publish/subscribe messages.
//!
//! Turns a byte stream into typed [`Message`]s and back. Transport, sessions,
//! keep-alive and QoS bookkeeping are left to the caller.
//!
//! ```text
//! | bit    |  7  |  6  |  5  |  4  |  3  |  2  |  1  |   0    |
//! | byte1  |     message type      | dup |   QoS     | retain |
//! | byte2+ |          remaining length (1-4 bytes)            |
//! |                         payload                            |
//! ```
//!
//! Strings on the wire are prefixed with the same variable length integer
//! used for the remaining length, not with a fixed two-byte length.

pub mod codec;
mod error;

use std::io::{Read, Write};

pub use codec::header::{FixedHeader, Limits};
pub use codec::types::{
    Ack, ConnAck, Connect, ConnectFlags, HeaderFlags, Message, MessageType, Publish, QoS,
    ReturnCode, SubAck, Subscribe, Subscription, Unsubscribe,
};
pub use codec::MqttCodec;
pub use error::{Error, Result};

/// Reads one complete message, blocking until it has arrived.
pub fn read<R: Read>(reader: &mut R) -> Result<Message> {
    codec::decoder::read_message(reader, &Limits::default())
}

/// Like [`read`], with caller-chosen length caps.
pub fn read_with_limits<R: Read>(reader: &mut R, limits: &Limits) -> Result<Message> {
    codec::decoder::read_message(reader, limits)
}

/// Writes one complete message.
pub fn write<W: Write>(writer: &mut W, message: &Message) -> Result<()> {
    codec::encoder::write_message(writer, message)
}

/// Writes a ConnAck carrying `return_code`.
pub fn write_connack<W: Write>(writer: &mut W, return_code: ReturnCode) -> Result<()> {
    write(writer, &Message::ConnAck(ConnAck::new(return_code)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::io::Cursor;

    #[test]
    fn ping_request_reencodes_identically() {
        let bytes = [0xC0u8, 0x00];
        let message = read(&mut &bytes[..]).unwrap();
        assert_eq!(message, Message::PingReq(HeaderFlags::default()));

        let mut out = Vec::new();
        write(&mut out, &message).unwrap();
        assert_eq!(out, bytes);
    }

    #[test]
    fn write_connack_bytes() {
        let mut out = Vec::new();
        write_connack(&mut out, ReturnCode::BadVersion).unwrap();
        assert_eq!(out, [0x20, 0x02, 0x00, 0x01]);

        let decoded = read(&mut &out[..]).unwrap();
        assert_eq!(decoded, Message::ConnAck(ConnAck::new(ReturnCode::BadVersion)));
    }

    #[test]
    fn stream_of_messages() {
        let messages = [
            Message::Connect(Connect {
                client_id: Bytes::from_static(b"c1"),
                keep_alive: 30,
                ..Connect::default()
            }),
            Message::Subscribe(Subscribe {
                header: HeaderFlags::with_qos(QoS::AtLeastOnce),
                message_id: 1,
                subscriptions: vec![Subscription::new(
                    Bytes::from_static(b"room/+/temp"),
                    QoS::AtLeastOnce,
                )],
            }),
            Message::Publish(Publish {
                header: HeaderFlags::with_qos(QoS::AtLeastOnce),
                topic: Bytes::from_static(b"room/1/temp"),
                message_id: 2,
                content: Bytes::from_static(b"21.5"),
            }),
            Message::PubAck(Ack::new(2)),
            Message::Disconnect(HeaderFlags::default()),
        ];

        let mut stream = Vec::new();
        for message in &messages {
            write(&mut stream, message).unwrap();
        }

        let mut reader = Cursor::new(stream);
        for message in &messages {
            assert_eq!(&read(&mut reader).unwrap(), message);
        }
        assert!(matches!(read(&mut reader), Err(Error::Io(_))));
    }

    #[test]
    fn read_with_custom_limits() {
        let mut out = Vec::new();
        write(
            &mut out,
            &Message::Publish(Publish {
                header: HeaderFlags::default(),
                topic: Bytes::from_static(b"t"),
                message_id: 0,
                content: Bytes::from(vec![0u8; 64]),
            }),
        )
        .unwrap();

        let limits = Limits {
            max_publish_length: 32,
            ..Limits::default()
        };
        assert!(matches!(
            read_with_limits(&mut &out[..], &limits),
            Err(Error::MessageTooLong { .. })
        ));
        assert!(read(&mut &out[..]).is_ok());
    }
}
