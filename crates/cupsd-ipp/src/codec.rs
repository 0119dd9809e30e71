// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 cupsd-rs contributors
//
// The IPP attribute codec (RFC 8010 §3). Decodes a binary message
// `{version, op-code, request-id, groups[]}` into a typed in-memory form and
// encodes the inverse. Multi-valued attributes of the same name are
// represented as one `Attribute` carrying N values, never as repeated
// attribute records (RFC 8010 §3.1.4's "additional value" convention is
// collapsed on decode and re-expanded on encode).

use std::collections::BTreeMap;

use cupsd_core::error::{Error, Result};

// ---------------------------------------------------------------------------
// Wire tags (RFC 8010 §3.5)
// ---------------------------------------------------------------------------

pub mod group_tag {
    pub const OPERATION: u8 = 0x01;
    pub const JOB: u8 = 0x02;
    pub const END_OF_ATTRIBUTES: u8 = 0x03;
    pub const PRINTER: u8 = 0x04;
    pub const UNSUPPORTED: u8 = 0x05;
    pub const SUBSCRIPTION: u8 = 0x06;
    pub const EVENT_NOTIFICATION: u8 = 0x07;
    pub const DOCUMENT: u8 = 0x09;
}

pub mod value_tag {
    pub const UNSUPPORTED: u8 = 0x10;
    pub const UNKNOWN: u8 = 0x12;
    pub const NO_VALUE: u8 = 0x13;
    pub const INTEGER: u8 = 0x21;
    pub const BOOLEAN: u8 = 0x22;
    pub const ENUM: u8 = 0x23;
    pub const OCTET_STRING: u8 = 0x30;
    pub const DATE_TIME: u8 = 0x31;
    pub const RESOLUTION: u8 = 0x32;
    pub const RANGE_OF_INTEGER: u8 = 0x33;
    pub const BEGIN_COLLECTION: u8 = 0x34;
    pub const TEXT_WITH_LANGUAGE: u8 = 0x35;
    pub const NAME_WITH_LANGUAGE: u8 = 0x36;
    pub const END_COLLECTION: u8 = 0x37;
    pub const TEXT_WITHOUT_LANGUAGE: u8 = 0x41;
    pub const NAME_WITHOUT_LANGUAGE: u8 = 0x42;
    pub const KEYWORD: u8 = 0x44;
    pub const URI: u8 = 0x45;
    pub const URI_SCHEME: u8 = 0x46;
    pub const CHARSET: u8 = 0x47;
    pub const NATURAL_LANGUAGE: u8 = 0x48;
    pub const MIME_MEDIA_TYPE: u8 = 0x49;
    pub const MEMBER_ATTR_NAME: u8 = 0x4a;
    pub const DELETE_ATTRIBUTE: u8 = 0x16;
}

/// Units for a `Resolution` value (RFC 8010 §3.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionUnits {
    DotsPerInch,
    DotsPerCentimeter,
}

/// A single typed IPP value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i32),
    Boolean(bool),
    Enum(i32),
    OctetString(Vec<u8>),
    DateTime(Vec<u8>),
    Resolution { x: i32, y: i32, units: ResolutionUnits },
    Range { lo: i32, hi: i32 },
    Collection(Vec<Attribute>),
    TextWithoutLanguage(String),
    NameWithoutLanguage(String),
    Keyword(String),
    Uri(String),
    UriScheme(String),
    Charset(String),
    NaturalLanguage(String),
    MimeMediaType(String),
    NoValue,
    Unknown,
    Unsupported,
    DeleteAttribute,
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::TextWithoutLanguage(s)
            | Self::NameWithoutLanguage(s)
            | Self::Keyword(s)
            | Self::Uri(s)
            | Self::UriScheme(s)
            | Self::Charset(s)
            | Self::NaturalLanguage(s)
            | Self::MimeMediaType(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i32> {
        match self {
            Self::Integer(v) | Self::Enum(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Self::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_range(&self) -> Option<(i32, i32)> {
        match self {
            Self::Range { lo, hi } => Some((*lo, *hi)),
            _ => None,
        }
    }

    pub fn as_collection(&self) -> Option<&[Attribute]> {
        match self {
            Self::Collection(attrs) => Some(attrs),
            _ => None,
        }
    }

    fn tag(&self) -> u8 {
        use value_tag::*;
        match self {
            Self::Integer(_) => INTEGER,
            Self::Boolean(_) => BOOLEAN,
            Self::Enum(_) => ENUM,
            Self::OctetString(_) => OCTET_STRING,
            Self::DateTime(_) => DATE_TIME,
            Self::Resolution { .. } => RESOLUTION,
            Self::Range { .. } => RANGE_OF_INTEGER,
            Self::Collection(_) => BEGIN_COLLECTION,
            Self::TextWithoutLanguage(_) => TEXT_WITHOUT_LANGUAGE,
            Self::NameWithoutLanguage(_) => NAME_WITHOUT_LANGUAGE,
            Self::Keyword(_) => KEYWORD,
            Self::Uri(_) => URI,
            Self::UriScheme(_) => URI_SCHEME,
            Self::Charset(_) => CHARSET,
            Self::NaturalLanguage(_) => NATURAL_LANGUAGE,
            Self::MimeMediaType(_) => MIME_MEDIA_TYPE,
            Self::NoValue => value_tag::NO_VALUE,
            Self::Unknown => value_tag::UNKNOWN,
            Self::Unsupported => value_tag::UNSUPPORTED,
            Self::DeleteAttribute => value_tag::DELETE_ATTRIBUTE,
        }
    }

    fn encode_body(&self) -> Vec<u8> {
        match self {
            Self::Integer(v) | Self::Enum(v) => v.to_be_bytes().to_vec(),
            Self::Boolean(v) => vec![if *v { 1 } else { 0 }],
            Self::OctetString(b) | Self::DateTime(b) => b.clone(),
            Self::Resolution { x, y, units } => {
                let mut out = Vec::with_capacity(9);
                out.extend_from_slice(&x.to_be_bytes());
                out.extend_from_slice(&y.to_be_bytes());
                out.push(match units {
                    ResolutionUnits::DotsPerInch => 3,
                    ResolutionUnits::DotsPerCentimeter => 4,
                });
                out
            }
            Self::Range { lo, hi } => {
                let mut out = Vec::with_capacity(8);
                out.extend_from_slice(&lo.to_be_bytes());
                out.extend_from_slice(&hi.to_be_bytes());
                out
            }
            Self::Collection(_) => Vec::new(), // written as member attributes, see encode_attribute
            Self::TextWithoutLanguage(s)
            | Self::NameWithoutLanguage(s)
            | Self::Keyword(s)
            | Self::Uri(s)
            | Self::UriScheme(s)
            | Self::Charset(s)
            | Self::NaturalLanguage(s)
            | Self::MimeMediaType(s) => s.as_bytes().to_vec(),
            Self::NoValue | Self::Unknown | Self::Unsupported | Self::DeleteAttribute => Vec::new(),
        }
    }

    fn decode(tag: u8, body: &[u8]) -> Result<Self> {
        use value_tag::*;
        Ok(match tag {
            INTEGER => Self::Integer(read_i32(body)?),
            BOOLEAN => Self::Boolean(body.first().copied().unwrap_or(0) != 0),
            ENUM => Self::Enum(read_i32(body)?),
            OCTET_STRING => Self::OctetString(body.to_vec()),
            DATE_TIME => Self::DateTime(body.to_vec()),
            RESOLUTION => {
                if body.len() < 9 {
                    return Err(Error::BadRequest("truncated resolution value".into()));
                }
                let x = read_i32(&body[0..4])?;
                let y = read_i32(&body[4..8])?;
                let units = if body[8] == 4 {
                    ResolutionUnits::DotsPerCentimeter
                } else {
                    ResolutionUnits::DotsPerInch
                };
                Self::Resolution { x, y, units }
            }
            RANGE_OF_INTEGER => {
                if body.len() < 8 {
                    return Err(Error::BadRequest("truncated rangeOfInteger value".into()));
                }
                let lo = read_i32(&body[0..4])?;
                let hi = read_i32(&body[4..8])?;
                Self::Range { lo, hi }
            }
            TEXT_WITHOUT_LANGUAGE => Self::TextWithoutLanguage(to_utf8(body)),
            NAME_WITHOUT_LANGUAGE => Self::NameWithoutLanguage(to_utf8(body)),
            KEYWORD => Self::Keyword(to_utf8(body)),
            URI => Self::Uri(to_utf8(body)),
            URI_SCHEME => Self::UriScheme(to_utf8(body)),
            CHARSET => Self::Charset(to_utf8(body)),
            NATURAL_LANGUAGE => Self::NaturalLanguage(to_utf8(body)),
            MIME_MEDIA_TYPE => Self::MimeMediaType(to_utf8(body)),
            NO_VALUE => Self::NoValue,
            UNKNOWN => Self::Unknown,
            UNSUPPORTED => Self::Unsupported,
            DELETE_ATTRIBUTE => Self::DeleteAttribute,
            // textWithLanguage / nameWithLanguage: fall back to the inner
            // text, discarding the language subfield — not used by any
            // operation this daemon implements.
            TEXT_WITH_LANGUAGE | NAME_WITH_LANGUAGE => Self::TextWithoutLanguage(to_utf8(body)),
            other => {
                return Err(Error::BadRequest(format!("unsupported value-tag 0x{other:02x}")));
            }
        })
    }
}

fn read_i32(b: &[u8]) -> Result<i32> {
    if b.len() < 4 {
        return Err(Error::BadRequest("truncated integer value".into()));
    }
    Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

fn to_utf8(b: &[u8]) -> String {
    String::from_utf8_lossy(b).into_owned()
}

/// A decoded attribute: a name plus one or more values of the same type.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub values: Vec<Value>,
}

impl Attribute {
    pub fn single(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            values: vec![value],
        }
    }

    pub fn first(&self) -> Option<&Value> {
        self.values.first()
    }
}

/// An ordered sequence of attributes sharing a group delimiter tag.
#[derive(Debug, Clone, Default)]
pub struct Group {
    pub tag: u8,
    pub attributes: Vec<Attribute>,
}

impl Group {
    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name)?.first()?.as_str()
    }

    pub fn get_int(&self, name: &str) -> Option<i32> {
        self.get(name)?.first()?.as_integer()
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name)?.first()?.as_boolean()
    }

    pub fn get_strs(&self, name: &str) -> Vec<String> {
        self.get(name)
            .map(|a| a.values.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.attributes.push(Attribute::single(name, value));
    }

    pub fn set_many(&mut self, name: impl Into<String>, values: Vec<Value>) {
        self.attributes.push(Attribute {
            name: name.into(),
            values,
        });
    }
}

/// A fully decoded IPP message (request or response).
#[derive(Debug, Clone)]
pub struct Message {
    pub version_major: u8,
    pub version_minor: u8,
    /// operation-id on a request, status-code on a response.
    pub code: u16,
    pub request_id: u32,
    pub groups: Vec<Group>,
}

impl Message {
    pub fn new_request(operation_id: u16, request_id: u32) -> Self {
        Self {
            version_major: 1,
            version_minor: 1,
            code: operation_id,
            request_id,
            groups: Vec::new(),
        }
    }

    /// Builds a response carrying the mandatory operation-attributes
    /// defaults per §4.1: `attributes-charset` and
    /// `attributes-natural-language`.
    pub fn new_response(status: u16, request_id: u32) -> Self {
        let mut operation = Group {
            tag: group_tag::OPERATION,
            attributes: Vec::new(),
        };
        operation.set("attributes-charset", Value::Charset("utf-8".into()));
        operation.set(
            "attributes-natural-language",
            Value::NaturalLanguage("en-US".into()),
        );
        Self {
            version_major: 1,
            version_minor: 1,
            code: status,
            request_id,
            groups: vec![operation],
        }
    }

    pub fn group(&self, tag: u8) -> Option<&Group> {
        self.groups.iter().find(|g| g.tag == tag)
    }

    pub fn group_mut(&mut self, tag: u8) -> &mut Group {
        if let Some(idx) = self.groups.iter().position(|g| g.tag == tag) {
            &mut self.groups[idx]
        } else {
            self.groups.push(Group {
                tag,
                attributes: Vec::new(),
            });
            self.groups.last_mut().unwrap()
        }
    }

    pub fn operation_attrs(&self) -> Option<&Group> {
        self.group(group_tag::OPERATION)
    }

    pub fn job_attrs(&self) -> Option<&Group> {
        self.group(group_tag::JOB)
    }

    pub fn printer_attrs(&self) -> Option<&Group> {
        self.group(group_tag::PRINTER)
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

pub fn decode(data: &[u8]) -> Result<(Message, Vec<u8>)> {
    if data.len() < 8 {
        return Err(Error::BadRequest(format!(
            "IPP message too short: {} bytes (minimum 8)",
            data.len()
        )));
    }
    let version_major = data[0];
    let version_minor = data[1];
    let code = u16::from_be_bytes([data[2], data[3]]);
    let request_id = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);

    let mut pos = 8;
    let mut groups = Vec::new();
    let mut current: Option<Group> = None;
    let mut pending_collection_stack: Vec<(String, Vec<Attribute>)> = Vec::new();

    while pos < data.len() {
        let tag = data[pos];
        if tag <= 0x0f {
            if tag == group_tag::END_OF_ATTRIBUTES {
                pos += 1;
                break;
            }
            if let Some(g) = current.take() {
                groups.push(g);
            }
            current = Some(Group {
                tag,
                attributes: Vec::new(),
            });
            pos += 1;
            continue;
        }

        let value_tag = tag;
        pos += 1;
        if pos + 2 > data.len() {
            return Err(Error::BadRequest("truncated name-length".into()));
        }
        let name_len = u16::from_be_bytes([data[pos], data[pos + 1]]) as usize;
        pos += 2;
        if pos + name_len > data.len() {
            return Err(Error::BadRequest("truncated attribute name".into()));
        }
        let name = to_utf8(&data[pos..pos + name_len]);
        pos += name_len;
        if pos + 2 > data.len() {
            return Err(Error::BadRequest("truncated value-length".into()));
        }
        let value_len = u16::from_be_bytes([data[pos], data[pos + 1]]) as usize;
        pos += 2;
        if pos + value_len > data.len() {
            return Err(Error::BadRequest("truncated attribute value".into()));
        }
        let body = &data[pos..pos + value_len];
        pos += value_len;

        if value_tag == value_tag::BEGIN_COLLECTION {
            // Member values follow as memberAttrName/value pairs until the
            // matching end-collection tag (RFC 8010 §3.1.6).
            pending_collection_stack.push((name, Vec::new()));
            continue;
        }
        if value_tag == value_tag::END_COLLECTION {
            let (coll_name, members) = pending_collection_stack.pop().ok_or_else(|| {
                Error::BadRequest("end-collection without matching begin-collection".into())
            })?;
            let collection_attr = Attribute {
                name: coll_name,
                values: vec![Value::Collection(members)],
            };
            push_decoded(&mut pending_collection_stack, &mut current, collection_attr)?;
            continue;
        }
        if value_tag == value_tag::MEMBER_ATTR_NAME {
            let member_name = to_utf8(body);
            pending_collection_stack
                .last_mut()
                .ok_or_else(|| Error::BadRequest("memberAttrName outside collection".into()))?
                .1
                .push(Attribute {
                    name: member_name,
                    values: Vec::new(),
                });
            continue;
        }

        let value = Value::decode(value_tag, body)?;
        if name.is_empty() {
            // Additional value for the previous attribute (1setOf).
            if let Some((_, members)) = pending_collection_stack.last_mut() {
                if let Some(last) = members.last_mut() {
                    last.values.push(value);
                    continue;
                }
            }
            if let Some(g) = current.as_mut() {
                if let Some(last) = g.attributes.last_mut() {
                    last.values.push(value);
                    continue;
                }
            }
            return Err(Error::BadRequest("additional value with no preceding attribute".into()));
        }

        if let Some((_, members)) = pending_collection_stack.last_mut() {
            members.push(Attribute {
                name,
                values: vec![value],
            });
            continue;
        }

        let attr = Attribute {
            name,
            values: vec![value],
        };
        if let Some(g) = current.as_mut() {
            g.attributes.push(attr);
        }
    }

    if let Some(g) = current.take() {
        groups.push(g);
    }

    let document_data = if pos < data.len() { data[pos..].to_vec() } else { Vec::new() };

    Ok((
        Message {
            version_major,
            version_minor,
            code,
            request_id,
            groups,
        },
        document_data,
    ))
}

fn push_decoded(
    stack: &mut [(String, Vec<Attribute>)],
    current: &mut Option<Group>,
    attr: Attribute,
) -> Result<()> {
    if let Some((_, members)) = stack.last_mut() {
        members.push(attr);
        return Ok(());
    }
    if let Some(g) = current.as_mut() {
        g.attributes.push(attr);
        return Ok(());
    }
    Err(Error::BadRequest("attribute outside of any group".into()))
}

// ---------------------------------------------------------------------------
// Encoder
// ---------------------------------------------------------------------------

pub fn encode(msg: &Message) -> Vec<u8> {
    let mut buf = Vec::with_capacity(256);
    buf.push(msg.version_major);
    buf.push(msg.version_minor);
    buf.extend_from_slice(&msg.code.to_be_bytes());
    buf.extend_from_slice(&msg.request_id.to_be_bytes());

    for group in &msg.groups {
        buf.push(group.tag);
        for attr in &group.attributes {
            let mut first = true;
            for value in &attr.values {
                let name = if first { attr.name.as_str() } else { "" };
                first = false;
                encode_attribute(&mut buf, name, value);
            }
        }
    }
    buf.push(group_tag::END_OF_ATTRIBUTES);
    buf
}

fn encode_attribute(buf: &mut Vec<u8>, name: &str, value: &Value) {
    if let Value::Collection(members) = value {
        buf.push(value_tag::BEGIN_COLLECTION);
        write_name_value(buf, name, &[]);
        for member in members {
            buf.push(value_tag::MEMBER_ATTR_NAME);
            write_name_value(buf, "", member.name.as_bytes());
            for (i, v) in member.values.iter().enumerate() {
                let member_name = if i == 0 { "" } else { "" };
                encode_attribute_inner(buf, member_name, v);
            }
        }
        buf.push(value_tag::END_COLLECTION);
        write_name_value(buf, "", &[]);
        return;
    }
    encode_attribute_inner(buf, name, value);
}

fn encode_attribute_inner(buf: &mut Vec<u8>, name: &str, value: &Value) {
    buf.push(value.tag());
    write_name_value(buf, name, &value.encode_body());
}

fn write_name_value(buf: &mut Vec<u8>, name: &str, value: &[u8]) {
    let name_bytes = name.as_bytes();
    buf.extend_from_slice(&(name_bytes.len() as u16).to_be_bytes());
    buf.extend_from_slice(name_bytes);
    buf.extend_from_slice(&(value.len() as u16).to_be_bytes());
    buf.extend_from_slice(value);
}

/// Flattens a decoded group's attributes into a simple `name -> first value`
/// map, useful for callers that only care about scalar attributes (most of
/// the option translator's work).
pub fn flatten(group: &Group) -> BTreeMap<String, String> {
    group
        .attributes
        .iter()
        .filter_map(|a| Some((a.name.clone(), a.first()?.as_str()?.to_string())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> Vec<u8> {
        let mut msg = Message::new_request(0x0002, 1);
        let op = msg.group_mut(group_tag::OPERATION);
        op.set("attributes-charset", Value::Charset("utf-8".into()));
        op.set("attributes-natural-language", Value::NaturalLanguage("en-US".into()));
        op.set("printer-uri", Value::Uri("ipp://localhost/printers/foo".into()));
        op.set("requesting-user-name", Value::NameWithoutLanguage("alice".into()));
        op.set_many(
            "requested-attributes",
            vec![Value::Keyword("printer-name".into()), Value::Keyword("printer-state".into())],
        );
        encode(&msg)
    }

    #[test]
    fn round_trips_scalar_and_multi_value_attributes() {
        let bytes = sample_request();
        let (msg, doc) = decode(&bytes).unwrap();
        assert_eq!(msg.code, 0x0002);
        assert_eq!(msg.request_id, 1);
        assert!(doc.is_empty());
        let op = msg.operation_attrs().unwrap();
        assert_eq!(op.get_str("printer-uri"), Some("ipp://localhost/printers/foo"));
        assert_eq!(op.get_str("requesting-user-name"), Some("alice"));
        assert_eq!(
            op.get_strs("requested-attributes"),
            vec!["printer-name".to_string(), "printer-state".to_string()]
        );
    }

    #[test]
    fn response_carries_mandatory_charset_and_language() {
        let msg = Message::new_response(0x0000, 7);
        let op = msg.operation_attrs().unwrap();
        assert_eq!(op.get_str("attributes-charset"), Some("utf-8"));
        assert_eq!(op.get_str("attributes-natural-language"), Some("en-US"));
    }

    #[test]
    fn document_bytes_follow_end_of_attributes_tag() {
        let mut bytes = sample_request();
        bytes.extend_from_slice(b"%PDF-1.4 fake body");
        let (_, doc) = decode(&bytes).unwrap();
        assert_eq!(doc, b"%PDF-1.4 fake body");
    }

    #[test]
    fn range_value_round_trips() {
        let mut msg = Message::new_request(0x0002, 2);
        let job = msg.group_mut(group_tag::JOB);
        job.set("page-ranges", Value::Range { lo: 1, hi: 5 });
        let bytes = encode(&msg);
        let (decoded, _) = decode(&bytes).unwrap();
        let job = decoded.job_attrs().unwrap();
        assert_eq!(job.get("page-ranges").unwrap().first().unwrap().as_range(), Some((1, 5)));
    }
}
