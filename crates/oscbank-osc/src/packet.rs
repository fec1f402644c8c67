//! OSC 1.0 packet encoding and decoding
//!
//! Strings and blobs are null-terminated / length-prefixed and padded to a
//! multiple of 4 bytes; numbers are big-endian.

use thiserror::Error;

const BUNDLE_TAG: &[u8] = b"#bundle\0";

/// Deepest bundle nesting accepted from the network
pub const MAX_BUNDLE_DEPTH: usize = 16;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OscError {
    #[error("packet truncated at offset {0}")]
    Truncated(usize),
    #[error("packet length {0} is not a multiple of 4")]
    Misaligned(usize),
    #[error("invalid address {0:?}")]
    BadAddress(String),
    #[error("string is not valid UTF-8")]
    BadString,
    #[error("unsupported type tag {0:?}")]
    UnsupportedType(char),
    #[error("bundle element size {0} is invalid")]
    BadElementSize(i32),
    #[error("bundles nested deeper than {0}")]
    TooDeep(usize),
}

/// OSC argument
#[derive(Debug, Clone, PartialEq)]
pub enum OscType {
    Int(i32),
    Float(f32),
    String(String),
    Blob(Vec<u8>),
    Long(i64),
    Double(f64),
    Time(u64),
    Bool(bool),
    Nil,
    Inf,
}

impl OscType {
    fn tag(&self) -> char {
        match self {
            Self::Int(_) => 'i',
            Self::Float(_) => 'f',
            Self::String(_) => 's',
            Self::Blob(_) => 'b',
            Self::Long(_) => 'h',
            Self::Double(_) => 'd',
            Self::Time(_) => 't',
            Self::Bool(true) => 'T',
            Self::Bool(false) => 'F',
            Self::Nil => 'N',
            Self::Inf => 'I',
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OscMessage {
    pub addr: String,
    pub args: Vec<OscType>,
}

impl OscMessage {
    pub fn new(addr: impl Into<String>, args: Vec<OscType>) -> Self {
        Self {
            addr: addr.into(),
            args,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OscPacket {
    Message(OscMessage),
    Bundle { timetag: u64, content: Vec<OscPacket> },
}

impl OscPacket {
    /// Every message in the packet, bundles flattened in order
    pub fn messages(&self) -> Vec<&OscMessage> {
        let mut out = Vec::new();
        collect_messages(self, &mut out);
        out
    }
}

fn collect_messages<'a>(packet: &'a OscPacket, out: &mut Vec<&'a OscMessage>) {
    match packet {
        OscPacket::Message(msg) => out.push(msg),
        OscPacket::Bundle { content, .. } => {
            for inner in content {
                collect_messages(inner, out);
            }
        }
    }
}

/// Encode a packet
pub fn encode(packet: &OscPacket) -> Result<Vec<u8>, OscError> {
    let mut buf = Vec::new();
    match packet {
        OscPacket::Message(msg) => encode_message_into(msg, &mut buf)?,
        OscPacket::Bundle { timetag, content } => {
            buf.extend_from_slice(BUNDLE_TAG);
            buf.extend_from_slice(&timetag.to_be_bytes());
            for inner in content {
                let element = encode(inner)?;
                buf.extend_from_slice(&(element.len() as i32).to_be_bytes());
                buf.extend_from_slice(&element);
            }
        }
    }
    Ok(buf)
}

/// Encode a single message
pub fn encode_message(msg: &OscMessage) -> Result<Vec<u8>, OscError> {
    let mut buf = Vec::new();
    encode_message_into(msg, &mut buf)?;
    Ok(buf)
}

fn encode_message_into(msg: &OscMessage, buf: &mut Vec<u8>) -> Result<(), OscError> {
    if !msg.addr.starts_with('/') || msg.addr.contains('\0') {
        return Err(OscError::BadAddress(msg.addr.clone()));
    }
    write_string(buf, &msg.addr);

    let mut tags = String::with_capacity(msg.args.len() + 1);
    tags.push(',');
    tags.extend(msg.args.iter().map(OscType::tag));
    write_string(buf, &tags);

    for arg in &msg.args {
        match arg {
            OscType::Int(v) => buf.extend_from_slice(&v.to_be_bytes()),
            OscType::Float(v) => buf.extend_from_slice(&v.to_be_bytes()),
            OscType::String(s) => write_string(buf, s),
            OscType::Blob(b) => {
                buf.extend_from_slice(&(b.len() as i32).to_be_bytes());
                buf.extend_from_slice(b);
                pad(buf);
            }
            OscType::Long(v) => buf.extend_from_slice(&v.to_be_bytes()),
            OscType::Double(v) => buf.extend_from_slice(&v.to_be_bytes()),
            OscType::Time(v) => buf.extend_from_slice(&v.to_be_bytes()),
            OscType::Bool(_) | OscType::Nil | OscType::Inf => {}
        }
    }
    Ok(())
}

fn write_string(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(s.as_bytes());
    buf.push(0);
    pad(buf);
}

fn pad(buf: &mut Vec<u8>) {
    while buf.len() % 4 != 0 {
        buf.push(0);
    }
}

/// Decode a packet received in one datagram
pub fn decode(data: &[u8]) -> Result<OscPacket, OscError> {
    decode_nested(data, 0)
}

fn decode_nested(data: &[u8], depth: usize) -> Result<OscPacket, OscError> {
    if data.len() % 4 != 0 {
        return Err(OscError::Misaligned(data.len()));
    }
    let mut reader = Reader { data, pos: 0 };
    if data.starts_with(BUNDLE_TAG) {
        if depth >= MAX_BUNDLE_DEPTH {
            return Err(OscError::TooDeep(MAX_BUNDLE_DEPTH));
        }
        reader.pos = BUNDLE_TAG.len();
        let timetag = reader.u64()?;
        let mut content = Vec::new();
        while reader.pos < data.len() {
            let size = reader.i32()?;
            if size < 0 || size % 4 != 0 {
                return Err(OscError::BadElementSize(size));
            }
            let element = reader.take(size as usize)?;
            content.push(decode_nested(element, depth + 1)?);
        }
        Ok(OscPacket::Bundle { timetag, content })
    } else {
        decode_message(&mut reader).map(OscPacket::Message)
    }
}

fn decode_message(reader: &mut Reader<'_>) -> Result<OscMessage, OscError> {
    let addr = reader.string()?;
    if !addr.starts_with('/') {
        return Err(OscError::BadAddress(addr));
    }

    // Messages without a type tag string carry no arguments
    if reader.remaining() == 0 {
        return Ok(OscMessage::new(addr, Vec::new()));
    }
    let tags = reader.string()?;
    let tags = tags
        .strip_prefix(',')
        .ok_or_else(|| OscError::UnsupportedType(tags.chars().next().unwrap_or('\0')))?
        .to_string();

    let mut args = Vec::with_capacity(tags.len());
    for tag in tags.chars() {
        let arg = match tag {
            'i' => OscType::Int(reader.i32()?),
            'f' => OscType::Float(f32::from_bits(reader.i32()? as u32)),
            's' | 'S' => OscType::String(reader.string()?),
            'b' => {
                let len = reader.i32()?;
                if len < 0 {
                    return Err(OscError::BadElementSize(len));
                }
                let blob = reader.take(len as usize)?.to_vec();
                reader.align()?;
                OscType::Blob(blob)
            }
            'h' => OscType::Long(reader.u64()? as i64),
            'd' => OscType::Double(f64::from_bits(reader.u64()?)),
            't' => OscType::Time(reader.u64()?),
            'T' => OscType::Bool(true),
            'F' => OscType::Bool(false),
            'N' => OscType::Nil,
            'I' => OscType::Inf,
            other => return Err(OscError::UnsupportedType(other)),
        };
        args.push(arg);
    }
    Ok(OscMessage::new(addr, args))
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], OscError> {
        if len > self.remaining() {
            return Err(OscError::Truncated(self.pos));
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn align(&mut self) -> Result<(), OscError> {
        let padding = (4 - self.pos % 4) % 4;
        self.take(padding).map(|_| ())
    }

    fn i32(&mut self) -> Result<i32, OscError> {
        let bytes = self.take(4)?;
        Ok(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn u64(&mut self) -> Result<u64, OscError> {
        let bytes = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(u64::from_be_bytes(raw))
    }

    fn string(&mut self) -> Result<String, OscError> {
        let rest = &self.data[self.pos..];
        let end = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(OscError::Truncated(self.pos))?;
        let s = std::str::from_utf8(&rest[..end])
            .map_err(|_| OscError::BadString)?
            .to_string();
        self.take(end + 1)?;
        self.align()?;
        Ok(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_channel_report() {
        let msg = OscMessage::new("/phidget1012/5", vec![OscType::Int(1)]);
        let bytes = encode_message(&msg).unwrap();

        let mut expected = b"/phidget1012/5\0\0".to_vec();
        expected.extend_from_slice(b",i\0\0");
        expected.extend_from_slice(&[0, 0, 0, 1]);
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_decode_mixed_arguments() {
        let msg = OscMessage::new(
            "/498255/3",
            vec![
                OscType::Float(1.0),
                OscType::String("abc".to_string()),
                OscType::Bool(true),
                OscType::Blob(vec![1, 2, 3, 4, 5]),
                OscType::Double(-2.5),
                OscType::Long(1 << 40),
                OscType::Nil,
            ],
        );
        let decoded = decode(&encode_message(&msg).unwrap()).unwrap();
        assert_eq!(decoded, OscPacket::Message(msg));
    }

    #[test]
    fn test_decode_bundle_flattens_messages() {
        let packet = OscPacket::Bundle {
            timetag: 1,
            content: vec![
                OscPacket::Message(OscMessage::new("/phidget1012/0", vec![OscType::Int(1)])),
                OscPacket::Bundle {
                    timetag: 1,
                    content: vec![OscPacket::Message(OscMessage::new(
                        "/phidget1012/1",
                        vec![OscType::Int(0)],
                    ))],
                },
            ],
        };
        let decoded = decode(&encode(&packet).unwrap()).unwrap();
        let addrs: Vec<&str> = decoded.messages().iter().map(|m| m.addr.as_str()).collect();
        assert_eq!(addrs, vec!["/phidget1012/0", "/phidget1012/1"]);
    }

    #[test]
    fn test_message_without_type_tags() {
        let decoded = decode(b"/ping\0\0\0").unwrap();
        assert_eq!(decoded, OscPacket::Message(OscMessage::new("/ping", vec![])));
    }

    #[test]
    fn test_malformed_packets() {
        assert_eq!(decode(b"/abc\0"), Err(OscError::Misaligned(5)));
        assert!(matches!(decode(b"abc\0"), Err(OscError::BadAddress(_))));
        // Type tag claims an int that is not there
        assert!(matches!(
            decode(b"/a\0\0,i\0\0"),
            Err(OscError::Truncated(_))
        ));
        assert!(matches!(
            decode(b"/a\0\0,x\0\0"),
            Err(OscError::UnsupportedType('x'))
        ));
        assert!(encode_message(&OscMessage::new("no-slash", vec![])).is_err());
    }

    /// `levels` bundles wrapped around one empty message
    fn nested_bundle(levels: usize) -> Vec<u8> {
        let mut packet = b"/a\0\0,\0\0\0".to_vec();
        for _ in 0..levels {
            let mut outer = BUNDLE_TAG.to_vec();
            outer.extend_from_slice(&1u64.to_be_bytes());
            outer.extend_from_slice(&(packet.len() as i32).to_be_bytes());
            outer.extend_from_slice(&packet);
            packet = outer;
        }
        packet
    }

    #[test]
    fn test_deeply_nested_bundle_is_rejected() {
        let packet = nested_bundle(3000);
        assert_eq!(decode(&packet), Err(OscError::TooDeep(MAX_BUNDLE_DEPTH)));

        let shallow = decode(&nested_bundle(MAX_BUNDLE_DEPTH)).unwrap();
        assert_eq!(shallow.messages()[0].addr, "/a");
        assert!(decode(&nested_bundle(MAX_BUNDLE_DEPTH + 1)).is_err());
    }
}
