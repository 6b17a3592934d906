//! XML to JSON-shaped tree conversion for KOPIS responses.
//!
//! Attributes and child elements share one object. A child name that occurs
//! once stays a single value and only a repeated name becomes a list, so
//! callers must check the shape of anything that may repeat.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::{Map, Value};
use thiserror::Error;

/// Key holding the text of an element that also has attributes or children.
pub const TEXT_KEY: &str = "_";

#[derive(Debug, Error)]
pub enum XmlError {
    #[error("invalid xml: {0}")]
    Syntax(String),
    #[error("xml document has no root element")]
    Empty,
    #[error("text found outside the root element")]
    TextOutsideRoot,
    #[error("xml document has more than one root element")]
    MultipleRoots,
    #[error("element <{0}> is never closed")]
    Unclosed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum XmlValue {
    Text(String),
    Element(Vec<(String, XmlValue)>),
    Repeated(Vec<XmlValue>),
}

impl XmlValue {
    pub fn field(&self, name: &str) -> Option<&XmlValue> {
        match self {
            XmlValue::Element(fields) => fields
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value),
            _ => None,
        }
    }

    pub fn into_field(self, name: &str) -> Option<XmlValue> {
        match self {
            XmlValue::Element(fields) => fields
                .into_iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            XmlValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn into_json(self) -> Value {
        match self {
            XmlValue::Text(text) => Value::String(text),
            XmlValue::Element(fields) => Value::Object(
                fields
                    .into_iter()
                    .map(|(key, value)| (key, value.into_json()))
                    .collect::<Map<String, Value>>(),
            ),
            XmlValue::Repeated(items) => {
                Value::Array(items.into_iter().map(XmlValue::into_json).collect())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct XmlDocument {
    pub root_name: String,
    pub root: XmlValue,
}

struct Frame {
    name: String,
    fields: Vec<(String, XmlValue)>,
    text: String,
}

impl Frame {
    fn open(start: &BytesStart<'_>) -> Result<Self, XmlError> {
        let mut fields = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(syntax)?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value().map_err(syntax)?.into_owned();
            push_field(&mut fields, key, XmlValue::Text(value));
        }
        Ok(Self {
            name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
            fields,
            text: String::new(),
        })
    }

    fn finish(self) -> (String, XmlValue) {
        let Frame {
            name,
            mut fields,
            text,
        } = self;
        if fields.is_empty() {
            return (name, XmlValue::Text(text));
        }
        if !text.trim().is_empty() {
            push_field(&mut fields, TEXT_KEY.to_string(), XmlValue::Text(text));
        }
        (name, XmlValue::Element(fields))
    }
}

fn push_field(fields: &mut Vec<(String, XmlValue)>, key: String, value: XmlValue) {
    let Some((_, existing)) = fields.iter_mut().find(|(name, _)| *name == key) else {
        fields.push((key, value));
        return;
    };
    match existing {
        XmlValue::Repeated(items) => items.push(value),
        other => {
            let first = std::mem::replace(other, XmlValue::Repeated(Vec::new()));
            *other = XmlValue::Repeated(vec![first, value]);
        }
    }
}

fn syntax(err: impl std::fmt::Display) -> XmlError {
    XmlError::Syntax(err.to_string())
}

pub fn parse(input: &str) -> Result<XmlDocument, XmlError> {
    let mut reader = Reader::from_str(input);
    let mut stack: Vec<Frame> = Vec::new();
    let mut document: Option<XmlDocument> = None;

    loop {
        match reader.read_event().map_err(syntax)? {
            Event::Start(start) => {
                if stack.is_empty() && document.is_some() {
                    return Err(XmlError::MultipleRoots);
                }
                stack.push(Frame::open(&start)?);
            }
            Event::Empty(start) => {
                if stack.is_empty() && document.is_some() {
                    return Err(XmlError::MultipleRoots);
                }
                let frame = Frame::open(&start)?;
                close(frame, &mut stack, &mut document);
            }
            Event::End(_) => {
                let frame = stack
                    .pop()
                    .ok_or_else(|| XmlError::Syntax("unexpected closing tag".into()))?;
                close(frame, &mut stack, &mut document);
            }
            Event::Text(text) => {
                let text = text.unescape().map_err(syntax)?;
                append_text(&mut stack, &text)?;
            }
            Event::CData(data) => {
                let data = data.into_inner();
                append_text(&mut stack, &String::from_utf8_lossy(&data))?;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(frame) = stack.pop() {
        return Err(XmlError::Unclosed(frame.name));
    }
    document.ok_or(XmlError::Empty)
}

fn close(frame: Frame, stack: &mut [Frame], document: &mut Option<XmlDocument>) {
    let (name, value) = frame.finish();
    match stack.last_mut() {
        Some(parent) => push_field(&mut parent.fields, name, value),
        None => {
            *document = Some(XmlDocument {
                root_name: name,
                root: value,
            })
        }
    }
}

fn append_text(stack: &mut [Frame], text: &str) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(frame) => {
            frame.text.push_str(text);
            Ok(())
        }
        None if text.trim().is_empty() => Ok(()),
        None => Err(XmlError::TextOutsideRoot),
    }
}

#[cfg(test)]
#[path = "tests/xml_tests.rs"]
mod tests;
