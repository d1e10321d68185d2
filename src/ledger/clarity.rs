//! Clarity values as the Stacks node exchanges them on `call-read`, plus
//! c32check principal addresses.
//!
//! A value is one type-prefix byte followed by a big-endian body.

use bytes::{Buf, BufMut};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Clarity refuses values nested deeper than this
const MAX_DEPTH: usize = 32;

const TYPE_INT: u8 = 0x00;
const TYPE_UINT: u8 = 0x01;
const TYPE_BUFFER: u8 = 0x02;
const TYPE_TRUE: u8 = 0x03;
const TYPE_FALSE: u8 = 0x04;
const TYPE_STANDARD_PRINCIPAL: u8 = 0x05;
const TYPE_CONTRACT_PRINCIPAL: u8 = 0x06;
const TYPE_RESPONSE_OK: u8 = 0x07;
const TYPE_RESPONSE_ERR: u8 = 0x08;
const TYPE_NONE: u8 = 0x09;
const TYPE_SOME: u8 = 0x0a;
const TYPE_LIST: u8 = 0x0b;
const TYPE_TUPLE: u8 = 0x0c;
const TYPE_STRING_ASCII: u8 = 0x0d;
const TYPE_STRING_UTF8: u8 = 0x0e;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClarityError {
    #[error("Unexpected end of buffer")]
    EndOfBuffer,

    #[error("Unknown type prefix 0x{0:02x}")]
    UnknownType(u8),

    #[error("Invalid string payload: {0}")]
    InvalidString(String),

    #[error("{0} trailing bytes after value")]
    TrailingBytes(usize),

    #[error("Value nested deeper than {} levels", MAX_DEPTH)]
    DepthExceeded,

    #[error("Invalid hex: {0}")]
    InvalidHex(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClarityValue {
    Int(i128),
    UInt(u128),
    Buffer(Vec<u8>),
    Bool(bool),
    StandardPrincipal {
        version: u8,
        hash160: [u8; 20],
    },
    ContractPrincipal {
        version: u8,
        hash160: [u8; 20],
        name: String,
    },
    ResponseOk(Box<ClarityValue>),
    ResponseErr(Box<ClarityValue>),
    OptionalNone,
    OptionalSome(Box<ClarityValue>),
    List(Vec<ClarityValue>),
    Tuple(BTreeMap<String, ClarityValue>),
    StringAscii(String),
    StringUtf8(String),
}

impl ClarityValue {
    /// Standard principal from its c32check address
    pub fn principal(address: &str) -> Result<Self, ClarityError> {
        let (version, hash160) = parse_address(address)?;
        Ok(ClarityValue::StandardPrincipal { version, hash160 })
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write(&mut out);
        out
    }

    /// `0x`-prefixed hex, the form the node API expects for arguments
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.serialize()))
    }

    pub fn from_hex(input: &str) -> Result<Self, ClarityError> {
        let trimmed = input.strip_prefix("0x").unwrap_or(input);
        let bytes = hex::decode(trimmed).map_err(|e| ClarityError::InvalidHex(e.to_string()))?;
        Self::deserialize(&bytes)
    }

    pub fn deserialize(mut bytes: &[u8]) -> Result<Self, ClarityError> {
        let value = Self::read(&mut bytes, 0)?;
        if bytes.has_remaining() {
            return Err(ClarityError::TrailingBytes(bytes.remaining()));
        }
        Ok(value)
    }

    /// Principal rendered as an address (`S...` or `S....name`)
    pub fn as_principal_string(&self) -> Option<String> {
        match self {
            ClarityValue::StandardPrincipal { version, hash160 } => {
                c32_address(*version, hash160).ok()
            }
            ClarityValue::ContractPrincipal { version, hash160, name } => c32_address(*version, hash160)
                .ok()
                .map(|address| format!("{}.{}", address, name)),
            _ => None,
        }
    }

    fn write(&self, buf: &mut impl BufMut) {
        match self {
            ClarityValue::Int(v) => {
                buf.put_u8(TYPE_INT);
                buf.put_i128(*v);
            }
            ClarityValue::UInt(v) => {
                buf.put_u8(TYPE_UINT);
                buf.put_u128(*v);
            }
            ClarityValue::Buffer(data) => {
                buf.put_u8(TYPE_BUFFER);
                put_sized(buf, data);
            }
            ClarityValue::Bool(true) => buf.put_u8(TYPE_TRUE),
            ClarityValue::Bool(false) => buf.put_u8(TYPE_FALSE),
            ClarityValue::StandardPrincipal { version, hash160 } => {
                buf.put_u8(TYPE_STANDARD_PRINCIPAL);
                buf.put_u8(*version);
                buf.put_slice(hash160);
            }
            ClarityValue::ContractPrincipal { version, hash160, name } => {
                buf.put_u8(TYPE_CONTRACT_PRINCIPAL);
                buf.put_u8(*version);
                buf.put_slice(hash160);
                put_name(buf, name);
            }
            ClarityValue::ResponseOk(inner) => {
                buf.put_u8(TYPE_RESPONSE_OK);
                inner.write(buf);
            }
            ClarityValue::ResponseErr(inner) => {
                buf.put_u8(TYPE_RESPONSE_ERR);
                inner.write(buf);
            }
            ClarityValue::OptionalNone => buf.put_u8(TYPE_NONE),
            ClarityValue::OptionalSome(inner) => {
                buf.put_u8(TYPE_SOME);
                inner.write(buf);
            }
            ClarityValue::List(items) => {
                buf.put_u8(TYPE_LIST);
                buf.put_u32(items.len() as u32);
                for item in items {
                    item.write(buf);
                }
            }
            ClarityValue::Tuple(fields) => {
                buf.put_u8(TYPE_TUPLE);
                buf.put_u32(fields.len() as u32);
                for (name, value) in fields {
                    put_name(buf, name);
                    value.write(buf);
                }
            }
            ClarityValue::StringAscii(s) => {
                buf.put_u8(TYPE_STRING_ASCII);
                put_sized(buf, s.as_bytes());
            }
            ClarityValue::StringUtf8(s) => {
                buf.put_u8(TYPE_STRING_UTF8);
                put_sized(buf, s.as_bytes());
            }
        }
    }

    fn read(buf: &mut &[u8], depth: usize) -> Result<Self, ClarityError> {
        if depth > MAX_DEPTH {
            return Err(ClarityError::DepthExceeded);
        }

        at_least(buf, 1)?;
        let value = match buf.get_u8() {
            TYPE_INT => {
                at_least(buf, 16)?;
                ClarityValue::Int(buf.get_i128())
            }
            TYPE_UINT => {
                at_least(buf, 16)?;
                ClarityValue::UInt(buf.get_u128())
            }
            TYPE_BUFFER => {
                let len = read_len(buf)?;
                ClarityValue::Buffer(take(buf, len)?)
            }
            TYPE_TRUE => ClarityValue::Bool(true),
            TYPE_FALSE => ClarityValue::Bool(false),
            TYPE_STANDARD_PRINCIPAL => {
                let (version, hash160) = read_principal(buf)?;
                ClarityValue::StandardPrincipal { version, hash160 }
            }
            TYPE_CONTRACT_PRINCIPAL => {
                let (version, hash160) = read_principal(buf)?;
                let name = read_name(buf)?;
                ClarityValue::ContractPrincipal { version, hash160, name }
            }
            TYPE_RESPONSE_OK => ClarityValue::ResponseOk(Box::new(Self::read(buf, depth + 1)?)),
            TYPE_RESPONSE_ERR => ClarityValue::ResponseErr(Box::new(Self::read(buf, depth + 1)?)),
            TYPE_NONE => ClarityValue::OptionalNone,
            TYPE_SOME => ClarityValue::OptionalSome(Box::new(Self::read(buf, depth + 1)?)),
            TYPE_LIST => {
                let len = read_len(buf)?;
                // Every element is at least one byte
                at_least(buf, len)?;
                let mut items = Vec::with_capacity(len);
                for _ in 0..len {
                    items.push(Self::read(buf, depth + 1)?);
                }
                ClarityValue::List(items)
            }
            TYPE_TUPLE => {
                let len = read_len(buf)?;
                let mut fields = BTreeMap::new();
                for _ in 0..len {
                    let name = read_name(buf)?;
                    fields.insert(name, Self::read(buf, depth + 1)?);
                }
                ClarityValue::Tuple(fields)
            }
            TYPE_STRING_ASCII => {
                let len = read_len(buf)?;
                ClarityValue::StringAscii(read_string(buf, len, true)?)
            }
            TYPE_STRING_UTF8 => {
                let len = read_len(buf)?;
                ClarityValue::StringUtf8(read_string(buf, len, false)?)
            }
            other => return Err(ClarityError::UnknownType(other)),
        };

        Ok(value)
    }
}

impl fmt::Display for ClarityValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClarityValue::Int(v) => write!(f, "{}", v),
            ClarityValue::UInt(v) => write!(f, "u{}", v),
            ClarityValue::Buffer(data) => write!(f, "0x{}", hex::encode(data)),
            ClarityValue::Bool(v) => write!(f, "{}", v),
            ClarityValue::StandardPrincipal { .. } | ClarityValue::ContractPrincipal { .. } => {
                write!(f, "'{}", self.as_principal_string().unwrap_or_default())
            }
            ClarityValue::ResponseOk(inner) => write!(f, "(ok {})", inner),
            ClarityValue::ResponseErr(inner) => write!(f, "(err {})", inner),
            ClarityValue::OptionalNone => write!(f, "none"),
            ClarityValue::OptionalSome(inner) => write!(f, "(some {})", inner),
            ClarityValue::List(items) => {
                write!(f, "(list")?;
                for item in items {
                    write!(f, " {}", item)?;
                }
                write!(f, ")")
            }
            ClarityValue::Tuple(fields) => {
                write!(f, "(tuple")?;
                for (name, value) in fields {
                    write!(f, " ({} {})", name, value)?;
                }
                write!(f, ")")
            }
            ClarityValue::StringAscii(s) => write!(f, "{:?}", s),
            ClarityValue::StringUtf8(s) => write!(f, "u{:?}", s),
        }
    }
}

fn put_sized(buf: &mut impl BufMut, data: &[u8]) {
    buf.put_u32(data.len() as u32);
    buf.put_slice(data);
}

fn put_name(buf: &mut impl BufMut, name: &str) {
    buf.put_u8(name.len() as u8);
    buf.put_slice(name.as_bytes());
}

fn at_least(buf: &[u8], len: usize) -> Result<(), ClarityError> {
    if buf.remaining() < len {
        return Err(ClarityError::EndOfBuffer);
    }
    Ok(())
}

fn read_len(buf: &mut &[u8]) -> Result<usize, ClarityError> {
    at_least(buf, 4)?;
    Ok(buf.get_u32() as usize)
}

fn take(buf: &mut &[u8], len: usize) -> Result<Vec<u8>, ClarityError> {
    at_least(buf, len)?;
    let mut out = vec![0u8; len];
    buf.copy_to_slice(&mut out);
    Ok(out)
}

fn read_principal(buf: &mut &[u8]) -> Result<(u8, [u8; 20]), ClarityError> {
    at_least(buf, 21)?;
    let version = buf.get_u8();
    let mut hash160 = [0u8; 20];
    buf.copy_to_slice(&mut hash160);
    Ok((version, hash160))
}

fn read_name(buf: &mut &[u8]) -> Result<String, ClarityError> {
    at_least(buf, 1)?;
    let len = buf.get_u8() as usize;
    read_string(buf, len, true)
}

fn read_string(buf: &mut &[u8], len: usize, ascii: bool) -> Result<String, ClarityError> {
    let raw = take(buf, len)?;
    if ascii && !raw.is_ascii() {
        return Err(ClarityError::InvalidString("non-ascii byte in string-ascii".to_string()));
    }
    String::from_utf8(raw).map_err(|e| ClarityError::InvalidString(e.to_string()))
}

/// c32check address of a standard principal, e.g. `ST126KB6...`
pub fn c32_address(version: u8, hash160: &[u8; 20]) -> Result<String, ClarityError> {
    let encoded = c32::encode_check(hash160, version)
        .map_err(|e| ClarityError::InvalidAddress(e.to_string()))?;
    Ok(format!("S{}", encoded))
}

/// Split a c32check address into version byte and hash160, verifying the checksum
pub fn parse_address(address: &str) -> Result<(u8, [u8; 20]), ClarityError> {
    let invalid = |reason: String| ClarityError::InvalidAddress(format!("{}: {}", address, reason));

    let body = address
        .strip_prefix('S')
        .ok_or_else(|| invalid("must start with 'S'".to_string()))?;
    let (payload, version) = c32::decode_check(body).map_err(|e| invalid(e.to_string()))?;

    let hash160: [u8; 20] = payload
        .try_into()
        .map_err(|_| invalid("wrong payload length".to_string()))?;

    Ok((version, hash160))
}
