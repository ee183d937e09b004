//! Incremental parser for the output of a refresh command.
//!
//! ```text
//! record   := NODE-TOKEN ( "|" PROPERTY "|" VALUE )*
//! lines    := "/tmp/a|\n" "|size|42\n"
//! nul      := "/tmp/a\0" "|\0" "|size|42\0"
//! ```
//!
//! Output arrives in arbitrary chunks. The demuxer buffers bytes until a
//! whole token is available; a token it cannot use fails on its own and never
//! stops the stream.

use std::sync::Arc;

use tracing::trace;

use crate::constants::FIELD_SEPARATOR;
use crate::ParseError;
use crate::PropertyDefinition;
use crate::PropertyGroup;
use crate::PropertyValue;
use crate::ValueType;
use crate::WireFormat;

/// How node tokens are matched against the session's nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemuxMode {
    /// Exactly one node was requested; any other node is an error
    Single,
    /// Tokens are looked up among every node of the batch
    Batch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DemuxState {
    /// No node selected yet
    Ready,
    /// A node was matched; property tokens apply to it
    PostNode,
    /// The last node token was rejected; its properties are skipped
    Error,
}

/// A value parsed for the node at `item` of the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemuxRecord {
    pub item: usize,
    pub property: Arc<PropertyDefinition>,
    pub value: PropertyValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    /// A token was consumed, possibly yielding a value
    Done(Option<DemuxRecord>),
    /// No complete token is buffered; feed more bytes and retry
    NeedData,
    /// A token was consumed and rejected
    Failed(ParseError),
}

#[derive(Debug)]
pub struct StreamDemuxer {
    format: WireFormat,
    mode: DemuxMode,
    buffer: Vec<u8>,
    /// Bytes before this offset are known to hold no terminator
    scan_from: usize,
    state: DemuxState,
    current: Option<usize>,
}

impl StreamDemuxer {
    pub fn new(
        format: WireFormat,
        mode: DemuxMode,
    ) -> Self {
        Self {
            format,
            mode,
            buffer: Vec::new(),
            scan_from: 0,
            state: DemuxState::Ready,
            current: None,
        }
    }

    pub fn push(
        &mut self,
        chunk: &[u8],
    ) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Bytes waiting for their terminator
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Consumes the next complete token.
    ///
    /// `locations` are the node locations of the session, in item order.
    pub fn parse_next<S: AsRef<str>>(
        &mut self,
        locations: &[S],
        group: &PropertyGroup,
    ) -> ParseOutcome {
        let terminator = self.format.terminator();
        let Some(offset) = self.buffer[self.scan_from..].iter().position(|b| *b == terminator) else {
            self.scan_from = self.buffer.len();
            return ParseOutcome::NeedData;
        };
        let end = self.scan_from + offset;
        let token: Vec<u8> = self.buffer.drain(..=end).take(end).collect();
        self.scan_from = 0;

        if token.is_empty() {
            // blank line between records
            return ParseOutcome::Done(None);
        }
        if token.as_slice() == [FIELD_SEPARATOR] {
            // bare separator closing a node header
            return ParseOutcome::Done(None);
        }
        if token.first() == Some(&FIELD_SEPARATOR) {
            return self.parse_property(&token[1..], group);
        }
        self.parse_node(&token, locations)
    }

    /// Signals end of stream. Returns `true` when a final unterminated token
    /// was completed and must still be parsed.
    pub fn finish(&mut self) -> bool {
        if self.buffer.is_empty() {
            return false;
        }
        match self.format {
            WireFormat::Lines => {
                self.buffer.push(b'\n');
                true
            }
            WireFormat::Nul => {
                trace!(bytes = self.buffer.len(), "discarding unterminated trailing bytes");
                self.buffer.clear();
                self.scan_from = 0;
                false
            }
        }
    }

    fn parse_node<S: AsRef<str>>(
        &mut self,
        token: &[u8],
        locations: &[S],
    ) -> ParseOutcome {
        if self.state == DemuxState::PostNode {
            trace!("node token without closing separator, starting a new node");
        }
        self.current = None;
        self.state = DemuxState::Error;

        let path = match self.format {
            WireFormat::Lines => match token.strip_suffix(&[FIELD_SEPARATOR]) {
                Some(path) => path,
                None => {
                    return ParseOutcome::Failed(ParseError::MalformedNode(
                        String::from_utf8_lossy(token).into_owned(),
                    ))
                }
            },
            WireFormat::Nul => token,
        };
        let Ok(path) = std::str::from_utf8(path) else {
            return ParseOutcome::Failed(ParseError::InvalidEncoding);
        };

        let matched = match self.mode {
            DemuxMode::Single => match locations.first() {
                Some(expected) if expected.as_ref() == path => Ok(0),
                expected => Err(ParseError::NodeMismatch {
                    expected: expected.map(|e| e.as_ref().to_string()).unwrap_or_default(),
                    got: path.to_string(),
                }),
            },
            DemuxMode::Batch => locations
                .iter()
                .position(|l| l.as_ref() == path)
                .ok_or_else(|| ParseError::UnknownNode(path.to_string())),
        };

        match matched {
            Ok(item) => {
                self.current = Some(item);
                self.state = DemuxState::PostNode;
                ParseOutcome::Done(None)
            }
            Err(e) => ParseOutcome::Failed(e),
        }
    }

    fn parse_property(
        &mut self,
        body: &[u8],
        group: &PropertyGroup,
    ) -> ParseOutcome {
        let item = match (self.state, self.current) {
            (DemuxState::Error, _) => return ParseOutcome::Done(None),
            (DemuxState::PostNode, Some(item)) => item,
            _ => {
                return ParseOutcome::Failed(ParseError::NoCurrentNode(
                    String::from_utf8_lossy(body).into_owned(),
                ))
            }
        };

        let Some(split) = body.iter().position(|b| *b == FIELD_SEPARATOR) else {
            return ParseOutcome::Failed(ParseError::MissingSeparator(String::from_utf8_lossy(body).into_owned()));
        };
        let (name, value) = (&body[..split], &body[split + 1..]);

        let Some(property) = group.property(name) else {
            return ParseOutcome::Failed(ParseError::UnknownProperty(String::from_utf8_lossy(name).into_owned()));
        };

        match parse_value(property.value_type, value) {
            Some(value) => ParseOutcome::Done(Some(DemuxRecord {
                item,
                property: property.clone(),
                value,
            })),
            None => ParseOutcome::Failed(ParseError::InvalidValue {
                property: property.name.to_string(),
                value: String::from_utf8_lossy(value).into_owned(),
            }),
        }
    }
}

fn parse_value(
    value_type: ValueType,
    raw: &[u8],
) -> Option<PropertyValue> {
    match value_type {
        ValueType::String => Some(PropertyValue::String(String::from_utf8_lossy(raw).into_owned())),
        ValueType::Uint => {
            if raw.is_empty() || !raw.iter().all(u8::is_ascii_digit) {
                return None;
            }
            // all ASCII digits, so valid UTF-8; only overflow can fail here
            std::str::from_utf8(raw).ok()?.parse().ok().map(PropertyValue::Uint)
        }
    }
}
