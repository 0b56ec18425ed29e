use super::encoder::encoded_len;
use crate::error::{Error, Result};
use bytes::Bytes;
use num_enum::TryFromPrimitive;

/// Largest value a variable length integer can carry in four bytes.
pub const MAX_VARIABLE_INT: u32 = 268_435_455;

/// Remaining length cap for Publish messages.
pub const PUBLISH_MAX_LEN: u32 = 1024 * 1024;

/// Remaining length cap for every other message type.
pub const DEFAULT_MAX_LEN: u32 = 1024 * 10;

#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, TryFromPrimitive)]
pub enum MessageType {
    Connect = 1,
    ConnAck = 2,
    Publish = 3,
    PubAck = 4,
    PubRec = 5,
    PubRel = 6,
    PubComp = 7,
    Subscribe = 8,
    SubAck = 9,
    Unsubscribe = 10,
    UnsubAck = 11,
    PingReq = 12,
    PingResp = 13,
    Disconnect = 14,
}

impl MessageType {
    pub const ALL: [MessageType; 14] = [
        MessageType::Connect,
        MessageType::ConnAck,
        MessageType::Publish,
        MessageType::PubAck,
        MessageType::PubRec,
        MessageType::PubRel,
        MessageType::PubComp,
        MessageType::Subscribe,
        MessageType::SubAck,
        MessageType::Unsubscribe,
        MessageType::UnsubAck,
        MessageType::PingReq,
        MessageType::PingResp,
        MessageType::Disconnect,
    ];
}

#[repr(u8)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, TryFromPrimitive)]
#[allow(clippy::enum_variant_names)]
pub enum QoS {
    #[default]
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl QoS {
    pub(crate) fn from_bits(bits: u8) -> Result<Self> {
        QoS::try_from(bits).map_err(|_| Error::BadQosLevel(bits))
    }
}

#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, TryFromPrimitive)]
pub enum ReturnCode {
    Accepted = 0,
    BadVersion = 1,
    IdRejected = 2,
    ServerUnavailable = 3,
    BadUserPassword = 4,
}

/// Dup, QoS and retain bits of the fixed header.
///
/// Every message keeps the flags it arrived with, so a decoded message
/// re-encodes to the same header byte.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeaderFlags {
    pub dup: bool,
    pub qos: QoS,
    pub retain: bool,
}

impl HeaderFlags {
    pub fn with_qos(qos: QoS) -> Self {
        Self {
            qos,
            ..Self::default()
        }
    }
}

/// The connect flags byte, kept as it arrived.
///
/// Only [`ConnectFlags::will_qos`] can fail: a byte with both will-QoS bits set
/// still decodes and re-encodes unchanged.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConnectFlags(u8);

impl ConnectFlags {
    const RESERVED: u8 = 0b0000_0001;
    const CLEAN_SESSION: u8 = 0b0000_0010;
    const WILL: u8 = 0b0000_0100;
    const WILL_QOS: u8 = 0b0001_1000;
    const WILL_RETAIN: u8 = 0b0010_0000;
    const PASSWORD: u8 = 0b0100_0000;
    const USERNAME: u8 = 0b1000_0000;

    pub fn from_byte(byte: u8) -> Self {
        Self(byte)
    }

    pub fn to_byte(self) -> u8 {
        self.0
    }

    fn get(self, mask: u8) -> bool {
        self.0 & mask != 0
    }

    fn set(&mut self, mask: u8, on: bool) {
        if on {
            self.0 |= mask;
        } else {
            self.0 &= !mask;
        }
    }

    pub fn reserved(self) -> bool {
        self.get(Self::RESERVED)
    }

    pub fn clean_session(self) -> bool {
        self.get(Self::CLEAN_SESSION)
    }

    pub fn will(self) -> bool {
        self.get(Self::WILL)
    }

    pub fn will_qos(self) -> Result<QoS> {
        QoS::from_bits((self.0 & Self::WILL_QOS) >> 3)
    }

    pub fn will_retain(self) -> bool {
        self.get(Self::WILL_RETAIN)
    }

    pub fn password(self) -> bool {
        self.get(Self::PASSWORD)
    }

    pub fn username(self) -> bool {
        self.get(Self::USERNAME)
    }

    pub fn set_clean_session(&mut self, on: bool) {
        self.set(Self::CLEAN_SESSION, on);
    }

    pub fn set_will(&mut self, on: bool) {
        self.set(Self::WILL, on);
    }

    pub fn set_will_qos(&mut self, qos: QoS) {
        self.0 = (self.0 & !Self::WILL_QOS) | ((qos as u8) << 3);
    }

    pub fn set_will_retain(&mut self, on: bool) {
        self.set(Self::WILL_RETAIN, on);
    }

    pub fn set_password(&mut self, on: bool) {
        self.set(Self::PASSWORD, on);
    }

    pub fn set_username(&mut self, on: bool) {
        self.set(Self::USERNAME, on);
    }
}

// Messages

/// Connection request.
///
/// The will topic, will message, username and password are always present on
/// the wire, empty or not, whatever the connect flags say.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connect {
    pub header: HeaderFlags,

    // Variable header
    pub protocol_name: Bytes,
    pub protocol_version: u8,
    pub flags: ConnectFlags,
    pub keep_alive: u16,

    // Payload
    pub client_id: Bytes,
    pub will_topic: Bytes,
    pub will_message: Bytes,
    pub username: Bytes,
    pub password: Bytes,
}

impl Default for Connect {
    fn default() -> Self {
        Self {
            header: HeaderFlags::default(),
            protocol_name: Bytes::from_static(b"MQIsdp"),
            protocol_version: 3,
            flags: ConnectFlags::default(),
            keep_alive: 0,
            client_id: Bytes::new(),
            will_topic: Bytes::new(),
            will_message: Bytes::new(),
            username: Bytes::new(),
            password: Bytes::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnAck {
    pub header: HeaderFlags,
    pub return_code: ReturnCode,
}

impl ConnAck {
    pub fn new(return_code: ReturnCode) -> Self {
        Self {
            header: HeaderFlags::default(),
            return_code,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publish {
    pub header: HeaderFlags,
    pub topic: Bytes,
    /// Only on the wire when `header.qos` is above `AtMostOnce`; decodes as 0
    /// otherwise.
    pub message_id: u16,
    pub content: Bytes,
}

/// Body shared by PubAck, PubRec, PubRel, PubComp and UnsubAck.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub header: HeaderFlags,
    pub message_id: u16,
}

impl Ack {
    pub fn new(message_id: u16) -> Self {
        Self {
            header: HeaderFlags::default(),
            message_id,
        }
    }
}

/// A topic filter and its requested QoS byte, unvalidated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub topic: Bytes,
    pub qos: u8,
}

impl Subscription {
    pub fn new(topic: impl Into<Bytes>, qos: QoS) -> Self {
        Self {
            topic: topic.into(),
            qos: qos as u8,
        }
    }

    pub fn qos(&self) -> Result<QoS> {
        QoS::from_bits(self.qos)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscribe {
    pub header: HeaderFlags,
    pub message_id: u16,
    pub subscriptions: Vec<Subscription>,
}

/// One granted QoS byte per requested subscription. Bytes are kept as sent,
/// so a refusal such as 0x80 survives a decode and re-encode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubAck {
    pub header: HeaderFlags,
    pub message_id: u16,
    pub granted_qos: Vec<u8>,
}

impl SubAck {
    pub fn granted(&self) -> impl Iterator<Item = Result<QoS>> + '_ {
        self.granted_qos.iter().map(|&qos| QoS::from_bits(qos))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unsubscribe {
    pub header: HeaderFlags,
    pub message_id: u16,
    pub topics: Vec<Bytes>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Connect(Connect),
    ConnAck(ConnAck),
    Publish(Publish),
    PubAck(Ack),
    PubRec(Ack),
    PubRel(Ack),
    PubComp(Ack),
    Subscribe(Subscribe),
    SubAck(SubAck),
    Unsubscribe(Unsubscribe),
    UnsubAck(Ack),
    PingReq(HeaderFlags),
    PingResp(HeaderFlags),
    Disconnect(HeaderFlags),
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Connect(_) => MessageType::Connect,
            Message::ConnAck(_) => MessageType::ConnAck,
            Message::Publish(_) => MessageType::Publish,
            Message::PubAck(_) => MessageType::PubAck,
            Message::PubRec(_) => MessageType::PubRec,
            Message::PubRel(_) => MessageType::PubRel,
            Message::PubComp(_) => MessageType::PubComp,
            Message::Subscribe(_) => MessageType::Subscribe,
            Message::SubAck(_) => MessageType::SubAck,
            Message::Unsubscribe(_) => MessageType::Unsubscribe,
            Message::UnsubAck(_) => MessageType::UnsubAck,
            Message::PingReq(_) => MessageType::PingReq,
            Message::PingResp(_) => MessageType::PingResp,
            Message::Disconnect(_) => MessageType::Disconnect,
        }
    }

    pub fn header_flags(&self) -> HeaderFlags {
        match self {
            Message::Connect(p) => p.header,
            Message::ConnAck(p) => p.header,
            Message::Publish(p) => p.header,
            Message::PubAck(p)
            | Message::PubRec(p)
            | Message::PubRel(p)
            | Message::PubComp(p)
            | Message::UnsubAck(p) => p.header,
            Message::Subscribe(p) => p.header,
            Message::SubAck(p) => p.header,
            Message::Unsubscribe(p) => p.header,
            Message::PingReq(flags) | Message::PingResp(flags) | Message::Disconnect(flags) => {
                *flags
            }
        }
    }

    /// Message id of the messages that carry one. Publish only has an id on
    /// the wire above `AtMostOnce`.
    pub fn message_id(&self) -> Option<u16> {
        match self {
            Message::Publish(p) if p.header.qos != QoS::AtMostOnce => Some(p.message_id),
            Message::PubAck(p)
            | Message::PubRec(p)
            | Message::PubRel(p)
            | Message::PubComp(p)
            | Message::UnsubAck(p) => Some(p.message_id),
            Message::Subscribe(p) => Some(p.message_id),
            Message::SubAck(p) => Some(p.message_id),
            Message::Unsubscribe(p) => Some(p.message_id),
            Message::Connect(_)
            | Message::ConnAck(_)
            | Message::Publish(_)
            | Message::PingReq(_)
            | Message::PingResp(_)
            | Message::Disconnect(_) => None,
        }
    }

    /// Size of everything after the fixed header.
    pub fn calculate_size(&self) -> usize {
        self.calc_size()
    }
}

impl From<Connect> for Message {
    fn from(p: Connect) -> Self {
        Message::Connect(p)
    }
}

impl From<ConnAck> for Message {
    fn from(p: ConnAck) -> Self {
        Message::ConnAck(p)
    }
}

impl From<Publish> for Message {
    fn from(p: Publish) -> Self {
        Message::Publish(p)
    }
}

impl From<Subscribe> for Message {
    fn from(p: Subscribe) -> Self {
        Message::Subscribe(p)
    }
}

impl From<SubAck> for Message {
    fn from(p: SubAck) -> Self {
        Message::SubAck(p)
    }
}

impl From<Unsubscribe> for Message {
    fn from(p: Unsubscribe) -> Self {
        Message::Unsubscribe(p)
    }
}

pub(crate) trait PacketSize {
    fn calc_size(&self) -> usize;
}

impl PacketSize for u16 {
    fn calc_size(&self) -> usize {
        2
    }
}

impl PacketSize for Bytes {
    fn calc_size(&self) -> usize {
        // Oversized strings fail later, when the prefix is encoded
        encoded_len(self.len()).unwrap_or(4) + self.len()
    }
}

impl PacketSize for Subscription {
    fn calc_size(&self) -> usize {
        self.topic.calc_size() + 1
    }
}

impl<T: PacketSize> PacketSize for Vec<T> {
    fn calc_size(&self) -> usize {
        self.iter().map(|x| x.calc_size()).sum()
    }
}

impl PacketSize for Publish {
    /// Topic and message id only; the content follows without a prefix.
    fn calc_size(&self) -> usize {
        let mut size = self.topic.calc_size();
        if self.header.qos != QoS::AtMostOnce {
            size += self.message_id.calc_size();
        }
        size
    }
}

impl PacketSize for Message {
    fn calc_size(&self) -> usize {
        match self {
            Message::Connect(p) => {
                let mut size = p.protocol_name.calc_size();

                // Protocol version + connect flags + keep-alive
                size += 1 + 1 + 2;

                size += p.client_id.calc_size();
                size += p.will_topic.calc_size();
                size += p.will_message.calc_size();
                size += p.username.calc_size();
                size += p.password.calc_size();

                size
            }
            // Reserved byte + return code
            Message::ConnAck(_) => 1 + 1,
            Message::Publish(p) => p.calc_size() + p.content.len(),
            Message::PubAck(_)
            | Message::PubRec(_)
            | Message::PubRel(_)
            | Message::PubComp(_)
            | Message::UnsubAck(_) => 2,
            Message::Subscribe(p) => 2 + p.subscriptions.calc_size(),
            Message::SubAck(p) => 2 + p.granted_qos.len(),
            Message::Unsubscribe(p) => 2 + p.topics.calc_size(),
            Message::PingReq(_) | Message::PingResp(_) | Message::Disconnect(_) => 0,
        }
    }
}
