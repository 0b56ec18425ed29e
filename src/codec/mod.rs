pub mod decoder;
pub mod encoder;
pub mod header;
pub mod types;

use crate::error::Error;
use bytes::{Buf, BytesMut};
use header::Limits;
use tokio_util::codec::{Decoder, Encoder};
use types::Message;

/// Frames messages on an async byte stream, for use with
/// `tokio_util::codec::Framed`.
#[derive(Debug, Clone, Default)]
pub struct MqttCodec {
    limits: Limits,
}

impl MqttCodec {
    pub fn new() -> Self {
        MqttCodec::default()
    }

    pub fn with_limits(limits: Limits) -> Self {
        MqttCodec { limits }
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }
}

impl Decoder for MqttCodec {
    type Error = Error;
    type Item = Message;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some((header, header_len)) = decoder::parse_header(&buf[..], &self.limits)? else {
            return Ok(None);
        };

        let frame_len = header_len + header.remaining_length as usize;
        if buf.len() < frame_len {
            // If we don't have the full payload, wait for more
            buf.reserve(frame_len - buf.len());
            return Ok(None);
        }

        let mut frame = buf.split_to(frame_len).freeze();
        frame.advance(header_len);

        decoder::decode_payload(&header, frame).map(Some)
    }
}

impl Encoder<Message> for MqttCodec {
    type Error = Error;

    fn encode(&mut self, message: Message, bytes: &mut BytesMut) -> Result<(), Self::Error> {
        encoder::encode_message(&message, bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::types::*;
    use super::*;
    use bytes::Bytes;
    use futures::{SinkExt, StreamExt};
    use tokio_util::codec::{FramedRead, FramedWrite};

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_test_writer()
            .try_init();
    }

    fn roundtrip(message: Message) {
        let mut bytes = BytesMut::new();
        encoder::encode_message(&message, &mut bytes).unwrap();

        let mut reader = &bytes[..];
        let decoded = decoder::read_message(&mut reader, &Limits::default()).unwrap();
        assert!(reader.is_empty());
        assert_eq!(message, decoded);

        let mut written = Vec::new();
        encoder::write_message(&mut written, &message).unwrap();
        assert_eq!(&written[..], &bytes[..]);
    }

    #[test]
    fn connect_roundtrip() {
        let mut flags = ConnectFlags::default();
        flags.set_clean_session(true);
        flags.set_will(true);
        flags.set_will_qos(QoS::AtLeastOnce);
        flags.set_will_retain(true);
        flags.set_username(true);
        flags.set_password(true);

        roundtrip(Message::Connect(Connect {
            protocol_name: Bytes::from_static(b"MQIsdp"),
            protocol_version: 3,
            flags,
            keep_alive: 200,
            client_id: Bytes::from_static(b"test_client"),
            will_topic: Bytes::from_static(b"last/will"),
            will_message: Bytes::from_static(b"gone"),
            username: Bytes::from_static(b"user"),
            password: Bytes::from_static(b"secret"),
            ..Connect::default()
        }));
    }

    #[test]
    fn connect_ack_roundtrip() {
        roundtrip(Message::ConnAck(ConnAck::new(ReturnCode::ServerUnavailable)));
    }

    #[test]
    fn publish_roundtrip() {
        roundtrip(Message::Publish(Publish {
            header: HeaderFlags {
                dup: true,
                qos: QoS::ExactlyOnce,
                retain: false,
            },
            topic: Bytes::from_static(b"test_topic"),
            message_id: 42,
            content: vec![22; 100].into(),
        }));
    }

    #[test]
    fn ack_roundtrip() {
        roundtrip(Message::PubAck(Ack::new(1500)));
        roundtrip(Message::PubRec(Ack::new(1500)));
        roundtrip(Message::PubRel(Ack {
            header: HeaderFlags::with_qos(QoS::AtLeastOnce),
            message_id: 1500,
        }));
        roundtrip(Message::PubComp(Ack::new(1500)));
        roundtrip(Message::UnsubAck(Ack::new(4321)));
    }

    #[test]
    fn subscribe_roundtrip() {
        roundtrip(Message::Subscribe(Subscribe {
            header: HeaderFlags::with_qos(QoS::AtLeastOnce),
            message_id: 4500,
            subscriptions: vec![
                Subscription::new(Bytes::from_static(b"test_topic"), QoS::AtLeastOnce),
                Subscription::new(Bytes::from_static(b"other/+"), QoS::AtMostOnce),
            ],
        }));
        roundtrip(Message::SubAck(SubAck {
            header: HeaderFlags::default(),
            message_id: 1234,
            granted_qos: vec![0x00, 0x02, 0x80],
        }));
        roundtrip(Message::Unsubscribe(Unsubscribe {
            header: HeaderFlags::with_qos(QoS::AtLeastOnce),
            message_id: 1234,
            topics: vec![Bytes::from_static(b"test_topic")],
        }));
    }

    #[test]
    fn header_only_roundtrip() {
        roundtrip(Message::PingReq(HeaderFlags::default()));
        roundtrip(Message::PingResp(HeaderFlags::default()));
        roundtrip(Message::Disconnect(HeaderFlags::default()));
    }

    #[test]
    fn decode_waits_for_whole_frame() {
        let message = Message::Publish(Publish {
            header: HeaderFlags::with_qos(QoS::AtLeastOnce),
            topic: Bytes::from_static(b"a/b"),
            message_id: 1,
            content: Bytes::from(vec![9u8; 300]),
        });
        let mut encoded = BytesMut::new();
        encoder::encode_message(&message, &mut encoded).unwrap();

        let mut codec = MqttCodec::new();
        for end in 0..encoded.len() {
            let mut partial = BytesMut::from(&encoded[..end]);
            assert!(codec.decode(&mut partial).unwrap().is_none());
            assert_eq!(partial.len(), end);
        }

        let mut full = encoded.clone();
        assert_eq!(codec.decode(&mut full).unwrap(), Some(message));
        assert!(full.is_empty());
    }

    #[test]
    fn decode_consecutive_frames() {
        let mut codec = MqttCodec::new();
        let mut bytes = BytesMut::new();
        codec
            .encode(Message::PingReq(HeaderFlags::default()), &mut bytes)
            .unwrap();
        codec.encode(Message::PubAck(Ack::new(5)), &mut bytes).unwrap();

        assert_eq!(
            codec.decode(&mut bytes).unwrap(),
            Some(Message::PingReq(HeaderFlags::default()))
        );
        assert_eq!(
            codec.decode(&mut bytes).unwrap(),
            Some(Message::PubAck(Ack::new(5)))
        );
        assert_eq!(codec.decode(&mut bytes).unwrap(), None);
    }

    #[test]
    fn decode_rejects_long_header_early() {
        let mut codec = MqttCodec::with_limits(Limits {
            max_publish_length: 64,
            max_length: 2,
        });
        let mut bytes = BytesMut::from(&[0x30, 0x41][..]);
        assert!(matches!(
            codec.decode(&mut bytes),
            Err(Error::MessageTooLong { length: 65, max: 64, .. })
        ));
    }

    #[tokio::test]
    async fn framed_stream() {
        init_tracing();

        let (client, server) = tokio::io::duplex(64);
        let mut sink = FramedWrite::new(client, MqttCodec::new());
        let mut stream = FramedRead::new(server, MqttCodec::new());

        let messages = vec![
            Message::Connect(Connect {
                client_id: Bytes::from_static(b"framed"),
                ..Connect::default()
            }),
            Message::Publish(Publish {
                header: HeaderFlags::default(),
                topic: Bytes::from_static(b"big"),
                message_id: 0,
                content: Bytes::from(vec![1u8; 1000]),
            }),
            Message::Disconnect(HeaderFlags::default()),
        ];

        let expected = messages.clone();
        let writer = tokio::spawn(async move {
            for message in messages {
                sink.send(message).await.unwrap();
            }
        });

        for message in expected {
            assert_eq!(stream.next().await.unwrap().unwrap(), message);
        }
        writer.await.unwrap();
    }
}
