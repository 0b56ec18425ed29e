use super::{
    header::FixedHeader,
    types::{
        Ack, ConnAck, Connect, Message, PacketSize, Publish, QoS, SubAck, Subscribe, Unsubscribe,
        MAX_VARIABLE_INT,
    },
};
use crate::error::{Error, Result};
use bytes::{BufMut, BytesMut};
use std::io::Write;
use tracing::trace;

/// Number of bytes `value` takes as a variable length integer, or `None` if
/// it is too large to encode.
pub fn encoded_len(value: usize) -> Option<usize> {
    match value {
        0..=127 => Some(1),
        128..=16_383 => Some(2),
        16_384..=2_097_151 => Some(3),
        2_097_152..=268_435_455 => Some(4),
        _ => None,
    }
}

/// Appends `value` in 7-bit groups, least significant first, and returns the
/// number of bytes written.
pub fn encode_variable_int(value: usize, bytes: &mut impl BufMut) -> Result<usize> {
    if value > MAX_VARIABLE_INT as usize {
        return Err(Error::VarintOutOfRange(value as u64));
    }

    let mut x = value;
    let mut byte_counter = 0;

    loop {
        let mut encoded_byte: u8 = (x % 128) as u8;
        x /= 128;

        if x > 0 {
            encoded_byte |= 128;
        }

        bytes.put_u8(encoded_byte);

        byte_counter += 1;

        if x == 0 {
            break;
        }
    }

    Ok(byte_counter)
}

pub fn write_variable_int<W: Write>(writer: &mut W, value: usize) -> Result<()> {
    let mut buf = [0u8; 4];
    let mut slice = &mut buf[..];
    let len = encode_variable_int(value, &mut slice)?;
    writer.write_all(&buf[..len])?;
    Ok(())
}

pub fn encode_string(value: &[u8], bytes: &mut BytesMut) -> Result<()> {
    encode_variable_int(value.len(), bytes)?;
    bytes.put_slice(value);
    Ok(())
}

pub fn write_string<W: Write>(writer: &mut W, value: &[u8]) -> Result<()> {
    write_variable_int(writer, value.len())?;
    writer.write_all(value)?;
    Ok(())
}

fn encode_header(header: &FixedHeader, bytes: &mut BytesMut) -> Result<()> {
    bytes.put_u8(header.to_byte());
    encode_variable_int(header.remaining_length as usize, bytes)?;
    Ok(())
}

fn header_for(message: &Message) -> Result<FixedHeader> {
    let remaining_length = message.calculate_size();
    if remaining_length > MAX_VARIABLE_INT as usize {
        return Err(Error::VarintOutOfRange(remaining_length as u64));
    }

    Ok(FixedHeader::new(
        message.message_type(),
        message.header_flags(),
        remaining_length as u32,
    ))
}

fn encode_connect(packet: &Connect, bytes: &mut BytesMut) -> Result<()> {
    encode_string(&packet.protocol_name, bytes)?;
    bytes.put_u8(packet.protocol_version);
    bytes.put_u8(packet.flags.to_byte());
    bytes.put_u16(packet.keep_alive);

    encode_string(&packet.client_id, bytes)?;
    encode_string(&packet.will_topic, bytes)?;
    encode_string(&packet.will_message, bytes)?;
    encode_string(&packet.username, bytes)?;
    encode_string(&packet.password, bytes)?;

    Ok(())
}

fn encode_connect_ack(packet: &ConnAck, bytes: &mut BytesMut) {
    // Reserved
    bytes.put_u8(0);
    bytes.put_u8(packet.return_code as u8);
}

/// Topic and message id, without the content. At QoS 0 the message id is
/// dropped, whatever its value.
fn encode_publish_prefix(packet: &Publish, bytes: &mut BytesMut) -> Result<()> {
    encode_string(&packet.topic, bytes)?;

    if packet.header.qos != QoS::AtMostOnce {
        bytes.put_u16(packet.message_id);
    }

    Ok(())
}

fn encode_publish(packet: &Publish, bytes: &mut BytesMut) -> Result<()> {
    encode_publish_prefix(packet, bytes)?;
    bytes.put_slice(&packet.content);
    Ok(())
}

fn encode_ack(packet: &Ack, bytes: &mut BytesMut) {
    bytes.put_u16(packet.message_id);
}

fn encode_subscribe(packet: &Subscribe, bytes: &mut BytesMut) -> Result<()> {
    bytes.put_u16(packet.message_id);

    for subscription in &packet.subscriptions {
        encode_string(&subscription.topic, bytes)?;
        bytes.put_u8(subscription.qos);
    }

    Ok(())
}

fn encode_subscribe_ack(packet: &SubAck, bytes: &mut BytesMut) {
    bytes.put_u16(packet.message_id);

    bytes.put_slice(&packet.granted_qos);
}

fn encode_unsubscribe(packet: &Unsubscribe, bytes: &mut BytesMut) -> Result<()> {
    bytes.put_u16(packet.message_id);

    for topic in &packet.topics {
        encode_string(topic, bytes)?;
    }

    Ok(())
}

fn encode_frame(message: &Message, bytes: &mut BytesMut) -> Result<FixedHeader> {
    let header = header_for(message)?;
    bytes.reserve(1 + 4 + header.remaining_length as usize);
    encode_header(&header, bytes)?;

    match message {
        Message::Connect(p) => encode_connect(p, bytes)?,
        Message::ConnAck(p) => encode_connect_ack(p, bytes),
        Message::Publish(p) => encode_publish(p, bytes)?,
        Message::PubAck(p)
        | Message::PubRec(p)
        | Message::PubRel(p)
        | Message::PubComp(p)
        | Message::UnsubAck(p) => encode_ack(p, bytes),
        Message::Subscribe(p) => encode_subscribe(p, bytes)?,
        Message::SubAck(p) => encode_subscribe_ack(p, bytes),
        Message::Unsubscribe(p) => encode_unsubscribe(p, bytes)?,
        Message::PingReq(_) | Message::PingResp(_) | Message::Disconnect(_) => (),
    }

    Ok(header)
}

/// Appends one complete message to `bytes`. On error `bytes` is left as it
/// was.
pub fn encode_message(message: &Message, bytes: &mut BytesMut) -> Result<()> {
    let start = bytes.len();
    match encode_frame(message, bytes) {
        Ok(header) => {
            trace!(
                message_type = ?header.message_type,
                remaining_length = header.remaining_length,
                "encoded message"
            );
            Ok(())
        }
        Err(err) => {
            bytes.truncate(start);
            Err(err)
        }
    }
}

/// Writes one complete message. Publish content goes straight from the
/// message to the writer instead of through an intermediate buffer.
pub fn write_message<W: Write>(writer: &mut W, message: &Message) -> Result<()> {
    let Message::Publish(publish) = message else {
        let mut bytes = BytesMut::new();
        encode_message(message, &mut bytes)?;
        writer.write_all(&bytes)?;
        return Ok(());
    };

    let header = header_for(message)?;
    let mut prefix = BytesMut::with_capacity(1 + 4 + publish.calc_size());
    encode_header(&header, &mut prefix)?;
    encode_publish_prefix(publish, &mut prefix)?;

    writer.write_all(&prefix)?;
    writer.write_all(&publish.content)?;

    trace!(
        message_type = ?header.message_type,
        remaining_length = header.remaining_length,
        "wrote publish"
    );
    Ok(())
}
