//! Payload primitives shared by both packet catalogs.
//!
//! Integers are little-endian, `bool` is one byte, strings carry a 7-bit
//! varint byte length, sequences an `i32` element count and timestamps are
//! `i64` unix milliseconds. Every read is bounds checked against the frame.

use bytes::{Buf, BufMut, BytesMut};
use chrono::{DateTime, TimeZone, Utc};

/// Error types for payload decoding
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("Read out of bounds: needed={needed}, available={available}")]
    UnexpectedEof { needed: usize, available: usize },

    #[error("Varint length prefix overflow")]
    LengthOverflow,

    #[error("Invalid UTF-8 in string field")]
    InvalidUtf8,

    #[error("Negative sequence length: {0}")]
    NegativeLength(i32),

    #[error("Invalid {field} value: {value}")]
    InvalidValue { field: &'static str, value: i64 },
}

/// Cursor over one frame's payload.
pub struct PacketReader<'a> {
    buf: &'a [u8],
}

impl<'a> PacketReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    fn ensure(&self, needed: usize) -> Result<(), WireError> {
        if needed > self.buf.len() {
            return Err(WireError::UnexpectedEof {
                needed,
                available: self.buf.len(),
            });
        }
        Ok(())
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], WireError> {
        self.ensure(len)?;
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    /// Consumes everything left in the payload.
    pub fn read_rest(&mut self) -> &'a [u8] {
        std::mem::take(&mut self.buf)
    }

    /// Reads a 7-bit encoded length (at most five bytes).
    pub fn read_varint(&mut self) -> Result<u32, WireError> {
        let mut value: u32 = 0;
        for shift in (0..35).step_by(7) {
            self.ensure(1)?;
            let byte = self.buf.get_u8();
            if shift == 28 && byte > 0x0F {
                return Err(WireError::LengthOverflow);
            }
            value |= u32::from(byte & 0x7F) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(WireError::LengthOverflow)
    }
}

/// Writes a 7-bit encoded length.
pub fn put_varint(out: &mut BytesMut, mut value: u32) {
    while value >= 0x80 {
        out.put_u8((value as u8) | 0x80);
        value >>= 7;
    }
    out.put_u8(value as u8);
}

/// A value with a fixed wire representation.
pub trait Wire: Sized {
    fn read(r: &mut PacketReader<'_>) -> Result<Self, WireError>;
    fn write(&self, out: &mut BytesMut);
}

macro_rules! wire_int {
    ($($ty:ty => $get:ident, $put:ident;)*) => {
        $(
            impl Wire for $ty {
                fn read(r: &mut PacketReader<'_>) -> Result<Self, WireError> {
                    r.ensure(std::mem::size_of::<$ty>())?;
                    Ok(r.buf.$get())
                }

                fn write(&self, out: &mut BytesMut) {
                    out.$put(*self);
                }
            }
        )*
    };
}

wire_int! {
    u8 => get_u8, put_u8;
    i16 => get_i16_le, put_i16_le;
    u16 => get_u16_le, put_u16_le;
    i32 => get_i32_le, put_i32_le;
    u32 => get_u32_le, put_u32_le;
    i64 => get_i64_le, put_i64_le;
    u64 => get_u64_le, put_u64_le;
}

impl Wire for bool {
    fn read(r: &mut PacketReader<'_>) -> Result<Self, WireError> {
        match u8::read(r)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(WireError::InvalidValue {
                field: "bool",
                value: i64::from(other),
            }),
        }
    }

    fn write(&self, out: &mut BytesMut) {
        out.put_u8(u8::from(*self));
    }
}

impl Wire for String {
    fn read(r: &mut PacketReader<'_>) -> Result<Self, WireError> {
        let len = r.read_varint()? as usize;
        let bytes = r.read_bytes(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| WireError::InvalidUtf8)
    }

    fn write(&self, out: &mut BytesMut) {
        put_varint(out, self.len() as u32);
        out.put_slice(self.as_bytes());
    }
}

impl<T: Wire> Wire for Vec<T> {
    fn read(r: &mut PacketReader<'_>) -> Result<Self, WireError> {
        let count = i32::read(r)?;
        if count < 0 {
            return Err(WireError::NegativeLength(count));
        }
        // Every element occupies at least one byte, so a count larger than
        // the rest of the frame can never be satisfied.
        let count = count as usize;
        r.ensure(count)?;
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            items.push(T::read(r)?);
        }
        Ok(items)
    }

    fn write(&self, out: &mut BytesMut) {
        out.put_i32_le(self.len() as i32);
        for item in self {
            item.write(out);
        }
    }
}

impl Wire for DateTime<Utc> {
    fn read(r: &mut PacketReader<'_>) -> Result<Self, WireError> {
        let millis = i64::read(r)?;
        Utc.timestamp_millis_opt(millis)
            .single()
            .ok_or(WireError::InvalidValue {
                field: "timestamp",
                value: millis,
            })
    }

    fn write(&self, out: &mut BytesMut) {
        out.put_i64_le(self.timestamp_millis());
    }
}

/// Declares a one-byte enum together with its checked `Wire` impl.
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $value:literal ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        #[repr(u8)]
        $vis enum $name {
            $( $(#[$vmeta])* $variant = $value, )*
        }

        impl TryFrom<u8> for $name {
            type Error = $crate::network::wire::WireError;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $( $value => Ok(Self::$variant), )*
                    other => Err($crate::network::wire::WireError::InvalidValue {
                        field: stringify!($name),
                        value: i64::from(other),
                    }),
                }
            }
        }

        impl $crate::network::wire::Wire for $name {
            fn read(
                r: &mut $crate::network::wire::PacketReader<'_>,
            ) -> Result<Self, $crate::network::wire::WireError> {
                Self::try_from(<u8 as $crate::network::wire::Wire>::read(r)?)
            }

            fn write(&self, out: &mut ::bytes::BytesMut) {
                ::bytes::BufMut::put_u8(out, *self as u8);
            }
        }
    };
}

pub(crate) use wire_enum;
