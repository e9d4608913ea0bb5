
use std::collections::HashMap;

use crate::codec::{Decode, Decoder, Encode, Encoder};
use crate::error::Result;

/// Server-side failure detail, carried inside a [`Message`] rather than
/// raised as a transport error. Field names follow the data model's
/// `{code, detail}` pair (the reference implementation called these
/// `error`/`body`; renamed here to match the documented contract).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RpcError {
    pub code: String,
    pub detail: String,
}

impl RpcError {
    pub fn is_empty(&self) -> bool {
        self.code.is_empty() && self.detail.is_empty()
    }
}

impl Encode for RpcError {
    fn encode(&self, e: &mut Encoder) {
        e.write_bool(false); // is_null
        self.code.encode(e);
        self.detail.encode(e);
    }
}

impl Decode for RpcError {
    fn decode(d: &mut Decoder) -> Result<Self> {
        let is_null = d.read_bool()?;
        if is_null {
            return Ok(RpcError::default());
        }
        Ok(RpcError {
            code: String::decode(d)?,
            detail: String::decode(d)?,
        })
    }
}

/// The envelope every request and response is wrapped in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Message {
    pub rpc: String,
    pub query: HashMap<String, String>,
    pub body: Vec<u8>,
    pub error: RpcError,
}

impl Message {
    pub fn request(rpc: impl Into<String>, query: HashMap<String, String>) -> Self {
        Message {
            rpc: rpc.into(),
            query,
            body: Vec::new(),
            error: RpcError::default(),
        }
    }
}

impl Encode for Message {
    fn encode(&self, e: &mut Encoder) {
        e.write_bool(false); // is_null
        self.rpc.encode(e);
        e.write_map(&self.query);
        e.write_bytes(&self.body);
        self.error.encode(e);
    }
}

impl Decode for Message {
    fn decode(d: &mut Decoder) -> Result<Self> {
        let is_null = d.read_bool()?;
        if is_null {
            return Ok(Message::default());
        }
        let rpc = String::decode(d)?;
        let query = d.read_map()?;
        let body = d.read_bytes()?;
        let error = RpcError::decode(d)?;
        Ok(Message {
            rpc,
            query,
            body,
            error,
        })
    }
}
