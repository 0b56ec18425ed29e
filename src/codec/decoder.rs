use super::{
    header::{FixedHeader, Limits},
    types::{
        Ack, ConnAck, Connect, ConnectFlags, HeaderFlags, Message, MessageType, Publish, QoS,
        ReturnCode, SubAck, Subscribe, Subscription, Unsubscribe,
    },
};
use crate::error::{Error, Result};
use bytes::{Buf, Bytes};
use std::io::{ErrorKind, Read};
use tracing::{debug, trace};

pub fn read_u8<R: Read>(reader: &mut R) -> Result<u8> {
    let mut buf = [0u8; 1];
    reader.read_exact(&mut buf)?;
    Ok(buf[0])
}

pub fn read_u16<R: Read>(reader: &mut R) -> Result<u16> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf)?;
    Ok(u16::from_be_bytes(buf))
}

/// Reads a 1-4 byte variable length integer.
pub fn read_variable_int<R: Read>(reader: &mut R) -> Result<u32> {
    let mut value: u32 = 0;

    for shift in [0, 7, 14, 21] {
        let encoded_byte = read_u8(reader)?;

        value |= ((encoded_byte & 0b0111_1111) as u32) << shift;

        if encoded_byte & 0b1000_0000 == 0b0000_0000 {
            return Ok(value);
        }
    }

    Err(Error::MalformedVarint)
}

/// Reads a variable-length-prefixed byte string.
pub fn read_string<R: Read>(reader: &mut R) -> Result<Bytes> {
    let len = read_variable_int(reader)? as u64;

    // The buffer grows with what actually arrives, not with the prefix
    let mut buf = Vec::new();
    reader.by_ref().take(len).read_to_end(&mut buf)?;
    if (buf.len() as u64) < len {
        return Err(std::io::Error::from(ErrorKind::UnexpectedEof).into());
    }

    Ok(Bytes::from(buf))
}

fn is_eof(err: &Error) -> bool {
    matches!(err, Error::Io(err) if err.kind() == ErrorKind::UnexpectedEof)
}

/// Payload bounded by the remaining length. Reading past the end means the
/// declared length does not match the content.
struct Payload(Bytes);

impl Payload {
    fn u8(&mut self) -> Result<u8> {
        if !self.0.has_remaining() {
            return Err(Error::WrongLength);
        }

        Ok(self.0.get_u8())
    }

    fn u16(&mut self) -> Result<u16> {
        if self.0.remaining() < 2 {
            return Err(Error::WrongLength);
        }

        Ok(self.0.get_u16())
    }

    fn string(&mut self) -> Result<Bytes> {
        let len = read_variable_int(&mut (&mut self.0).reader()).map_err(|err| {
            if is_eof(&err) {
                Error::WrongLength
            } else {
                err
            }
        })? as usize;

        if self.0.remaining() < len {
            return Err(Error::WrongLength);
        }

        Ok(self.0.split_to(len))
    }

    fn rest(&mut self) -> Bytes {
        std::mem::take(&mut self.0)
    }

    fn is_empty(&self) -> bool {
        !self.0.has_remaining()
    }

    fn finish(self) -> Result<()> {
        if self.0.has_remaining() {
            return Err(Error::WrongLength);
        }

        Ok(())
    }
}

fn decode_connect(header: HeaderFlags, payload: &mut Payload) -> Result<Message> {
    let protocol_name = payload.string()?;
    let protocol_version = payload.u8()?;
    let flags = ConnectFlags::from_byte(payload.u8()?);
    let keep_alive = payload.u16()?;

    // All five are on the wire regardless of the flags
    let client_id = payload.string()?;
    let will_topic = payload.string()?;
    let will_message = payload.string()?;
    let username = payload.string()?;
    let password = payload.string()?;

    Ok(Message::Connect(Connect {
        header,
        protocol_name,
        protocol_version,
        flags,
        keep_alive,
        client_id,
        will_topic,
        will_message,
        username,
        password,
    }))
}

fn decode_connect_ack(header: HeaderFlags, payload: &mut Payload) -> Result<Message> {
    // Reserved
    let _ = payload.u8()?;

    let code = payload.u8()?;
    let return_code = ReturnCode::try_from(code).map_err(|_| Error::BadReturnCode(code))?;

    Ok(Message::ConnAck(ConnAck {
        header,
        return_code,
    }))
}

fn decode_publish(header: HeaderFlags, payload: &mut Payload) -> Result<Message> {
    let topic = payload.string()?;

    let message_id = match header.qos {
        QoS::AtMostOnce => 0,
        QoS::AtLeastOnce | QoS::ExactlyOnce => payload.u16()?,
    };

    // This payload does not have a length prefix
    let content = payload.rest();

    Ok(Message::Publish(Publish {
        header,
        topic,
        message_id,
        content,
    }))
}

fn decode_ack(header: HeaderFlags, payload: &mut Payload) -> Result<Ack> {
    let message_id = payload.u16()?;
    Ok(Ack { header, message_id })
}

fn decode_subscribe(header: HeaderFlags, payload: &mut Payload) -> Result<Message> {
    let message_id = payload.u16()?;

    let mut subscriptions = vec![];
    while !payload.is_empty() {
        let topic = payload.string()?;
        let qos = payload.u8()?;
        subscriptions.push(Subscription { topic, qos });
    }

    Ok(Message::Subscribe(Subscribe {
        header,
        message_id,
        subscriptions,
    }))
}

fn decode_subscribe_ack(header: HeaderFlags, payload: &mut Payload) -> Result<Message> {
    let message_id = payload.u16()?;

    let mut granted_qos = vec![];
    while !payload.is_empty() {
        granted_qos.push(payload.u8()?);
    }

    Ok(Message::SubAck(SubAck {
        header,
        message_id,
        granted_qos,
    }))
}

fn decode_unsubscribe(header: HeaderFlags, payload: &mut Payload) -> Result<Message> {
    let message_id = payload.u16()?;

    let mut topics = vec![];
    while !payload.is_empty() {
        topics.push(payload.string()?);
    }

    Ok(Message::Unsubscribe(Unsubscribe {
        header,
        message_id,
        topics,
    }))
}

/// Decodes the payload of a message whose fixed header has already been read
/// and validated. `payload` must hold exactly `header.remaining_length` bytes.
pub fn decode_payload(header: &FixedHeader, payload: Bytes) -> Result<Message> {
    let mut payload = Payload(payload);
    let flags = header.flags;

    let message = match header.message_type {
        MessageType::Connect => decode_connect(flags, &mut payload)?,
        MessageType::ConnAck => decode_connect_ack(flags, &mut payload)?,
        MessageType::Publish => decode_publish(flags, &mut payload)?,
        MessageType::PubAck => Message::PubAck(decode_ack(flags, &mut payload)?),
        MessageType::PubRec => Message::PubRec(decode_ack(flags, &mut payload)?),
        MessageType::PubRel => Message::PubRel(decode_ack(flags, &mut payload)?),
        MessageType::PubComp => Message::PubComp(decode_ack(flags, &mut payload)?),
        MessageType::Subscribe => decode_subscribe(flags, &mut payload)?,
        MessageType::SubAck => decode_subscribe_ack(flags, &mut payload)?,
        MessageType::Unsubscribe => decode_unsubscribe(flags, &mut payload)?,
        MessageType::UnsubAck => Message::UnsubAck(decode_ack(flags, &mut payload)?),
        MessageType::PingReq => Message::PingReq(flags),
        MessageType::PingResp => Message::PingResp(flags),
        MessageType::Disconnect => Message::Disconnect(flags),
    };

    payload.finish()?;

    trace!(
        message_type = ?header.message_type,
        remaining_length = header.remaining_length,
        "decoded message"
    );

    Ok(message)
}

/// Parses a fixed header from the front of `bytes` without consuming it.
///
/// Returns the header and its encoded size, or `None` if `bytes` ends before
/// the remaining length does.
pub fn parse_header(bytes: &[u8], limits: &Limits) -> Result<Option<(FixedHeader, usize)>> {
    let Some((&first_byte, mut rest)) = bytes.split_first() else {
        return Ok(None);
    };

    let available = rest.len();
    let remaining_length = match read_variable_int(&mut rest) {
        Ok(len) => len,
        Err(err) if is_eof(&err) => return Ok(None),
        Err(err) => return Err(err),
    };
    let header_len = 1 + available - rest.len();

    let header = FixedHeader::parse(first_byte, remaining_length, limits).inspect_err(|err| {
        debug!(first_byte, remaining_length, %err, "rejected fixed header");
    })?;

    Ok(Some((header, header_len)))
}

/// Reads exactly one message from `reader`.
pub fn read_message<R: Read>(reader: &mut R, limits: &Limits) -> Result<Message> {
    let first_byte = read_u8(reader)?;
    let remaining_length = read_variable_int(reader)?;

    let header = FixedHeader::parse(first_byte, remaining_length, limits).inspect_err(|err| {
        debug!(first_byte, remaining_length, %err, "rejected fixed header");
    })?;

    let mut payload = vec![0u8; remaining_length as usize];
    reader.read_exact(&mut payload)?;

    decode_payload(&header, Bytes::from(payload))
}
