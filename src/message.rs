// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Messages
//!
//! Application-level messages and the raw messages received from the broker.

use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    io::{self, Read},
};

/// Header carrying the target partition of an outbound message
pub const PARTITION_HEADER: &str = "scst_partition";
/// Header carrying the unique id of an outbound message
pub const MESSAGE_ID_HEADER: &str = "message_id";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeaderValue {
    Bool(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    Text(String),
}

impl From<&str> for HeaderValue {
    fn from(value: &str) -> Self {
        HeaderValue::Text(value.to_owned())
    }
}

impl From<String> for HeaderValue {
    fn from(value: String) -> Self {
        HeaderValue::Text(value)
    }
}

impl From<i32> for HeaderValue {
    fn from(value: i32) -> Self {
        HeaderValue::Int(value)
    }
}

impl From<i64> for HeaderValue {
    fn from(value: i64) -> Self {
        HeaderValue::Long(value)
    }
}

impl From<bool> for HeaderValue {
    fn from(value: bool) -> Self {
        HeaderValue::Bool(value)
    }
}

pub type Headers = HashMap<String, HeaderValue>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Message {
    pub headers: Headers,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Message {
            headers: Headers::default(),
            payload: payload.into(),
        }
    }

    pub fn with_header(mut self, key: &str, value: impl Into<HeaderValue>) -> Self {
        self.headers.insert(key.to_owned(), value.into());
        self
    }

    pub fn header(&self, key: &str) -> Option<&HeaderValue> {
        self.headers.get(key)
    }
}

/// Byte stream body with a read position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BytesBody {
    data: Vec<u8>,
    position: usize,
}

impl BytesBody {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        BytesBody {
            data: data.into(),
            position: 0,
        }
    }

    /// Moves the read position back to the start of the body.
    pub fn reset(&mut self) {
        self.position = 0;
    }
}

impl Read for BytesBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = &self.data[self.position..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.position += n;
        Ok(n)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MessageBody {
    Text(String),
    Bytes(BytesBody),
}

/// Message as delivered by the broker.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub destination: String,
    pub headers: Headers,
    pub body: MessageBody,
}

impl InboundMessage {
    pub fn text(destination: &str, body: &str) -> Self {
        InboundMessage {
            destination: destination.to_owned(),
            headers: Headers::default(),
            body: MessageBody::Text(body.to_owned()),
        }
    }

    pub fn bytes(destination: &str, body: impl Into<Vec<u8>>) -> Self {
        InboundMessage {
            destination: destination.to_owned(),
            headers: Headers::default(),
            body: MessageBody::Bytes(BytesBody::new(body)),
        }
    }

    /// Rewinds a byte stream body so it can be read again.
    pub fn reset(&mut self) {
        if let MessageBody::Bytes(body) = &mut self.body {
            body.reset();
        }
    }

    /// Reads the remaining body into an application message.
    pub fn read_message(&mut self) -> io::Result<Message> {
        let payload = match &mut self.body {
            MessageBody::Text(text) => text.clone().into_bytes(),
            MessageBody::Bytes(body) => {
                let mut payload = vec![];
                body.read_to_end(&mut payload)?;
                payload
            }
        };

        Ok(Message {
            headers: self.headers.clone(),
            payload,
        })
    }
}
