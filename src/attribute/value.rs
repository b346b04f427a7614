//! Fixed-size item types
//!
//! One generic code path serves every numeric type; runtime dispatch happens
//! once per call through a match on [`ValueType`].

use std::fmt;
use std::mem::size_of;
use std::str::FromStr;

use crate::config::ValueType;

/// A fixed-size attribute item stored little-endian
pub trait AttrValue: Copy + PartialEq + fmt::Debug + FromStr + Default {
    const VALUE_TYPE: ValueType;
    const SIZE: usize;

    fn write_le(self, out: &mut Vec<u8>);

    /// Read from the first `SIZE` bytes of `bytes`
    fn read_le(bytes: &[u8]) -> Self;
}

macro_rules! impl_attr_value {
    ($($t:ty => $vt:ident),* $(,)?) => {
        $(
            impl AttrValue for $t {
                const VALUE_TYPE: ValueType = ValueType::$vt;
                const SIZE: usize = size_of::<$t>();

                fn write_le(self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }

                fn read_le(bytes: &[u8]) -> Self {
                    let mut buf = [0u8; size_of::<$t>()];
                    buf.copy_from_slice(&bytes[..size_of::<$t>()]);
                    <$t>::from_le_bytes(buf)
                }
            }
        )*
    };
}

impl_attr_value!(
    i8 => Int8,
    u8 => UInt8,
    i16 => Int16,
    u16 => UInt16,
    i32 => Int32,
    u32 => UInt32,
    i64 => Int64,
    u64 => UInt64,
    f32 => Float,
    f64 => Double,
);

fn parse_into<T: AttrValue>(token: &str, out: &mut Vec<u8>) -> bool {
    match token.trim().parse::<T>() {
        Ok(v) => {
            v.write_le(out);
            true
        }
        Err(_) => false,
    }
}

/// Parse one text token of `value_type` and append its binary form.
///
/// Returns false if the token does not parse. Strings are appended verbatim.
pub fn parse_token(value_type: ValueType, token: &str, out: &mut Vec<u8>) -> bool {
    match value_type {
        ValueType::Int8 => parse_into::<i8>(token, out),
        ValueType::UInt8 => parse_into::<u8>(token, out),
        ValueType::Int16 => parse_into::<i16>(token, out),
        ValueType::UInt16 => parse_into::<u16>(token, out),
        ValueType::Int32 => parse_into::<i32>(token, out),
        ValueType::UInt32 => parse_into::<u32>(token, out),
        ValueType::Int64 => parse_into::<i64>(token, out),
        ValueType::UInt64 => parse_into::<u64>(token, out),
        ValueType::Float => parse_into::<f32>(token, out),
        ValueType::Double => parse_into::<f64>(token, out),
        ValueType::String => {
            out.extend_from_slice(token.as_bytes());
            true
        }
    }
}
