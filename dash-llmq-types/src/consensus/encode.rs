// SPDX-License-Identifier: CC0-1.0

//! Consensus-encodable types.
//!
//! This is the serialization used on the Dash peer-to-peer network and in the
//! node's key-value stores: little-endian integers, compact-size ("VarInt")
//! length prefixes for vectors and packed bitsets for member flags.

use std::io::{self, Cursor, Read, Write};

use thiserror::Error;

/// Maximum size, in bytes, of a vector we are allowed to decode.
pub const MAX_VEC_SIZE: usize = 4_000_000;

/// Maximum number of bits in a dynamic bitset. Quorums never exceed a few hundred members.
pub const MAX_BITSET_SIZE: usize = 0x10000;

/// Encoding error.
#[derive(Debug, Error)]
pub enum Error {
    /// And I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Tried to allocate an oversized vector.
    #[error("allocation of oversized vector: requested {requested}, maximum {max}")]
    OversizedVectorAllocation {
        /// The capacity requested.
        requested: usize,
        /// The maximum capacity.
        max: usize,
    },

    /// VarInt was encoded in a non-minimal way.
    #[error("non-minimal varint")]
    NonMinimalVarInt,

    /// Unknown error code in a `qdata` message.
    #[error("unknown quorum data error code: {0}")]
    UnknownErrorCode(u8),

    /// Parsing error.
    #[error("parse failed: {0}")]
    ParseFailed(&'static str),
}

/// Encodes an object into a vector.
pub fn serialize<T: Encodable + ?Sized>(data: &T) -> Vec<u8> {
    let mut encoder = Vec::new();
    // Writing into a Vec cannot fail.
    let len = data.consensus_encode(&mut encoder).unwrap_or_default();
    debug_assert_eq!(len, encoder.len());
    encoder
}

/// Encodes an object into a hex-encoded string.
pub fn serialize_hex<T: Encodable + ?Sized>(data: &T) -> String {
    hex::encode(serialize(data))
}

/// Deserializes an object from a vector, will error if said deserialization
/// doesn't consume the entire vector.
pub fn deserialize<T: Decodable>(data: &[u8]) -> Result<T, Error> {
    let (rv, consumed) = deserialize_partial(data)?;

    if consumed == data.len() {
        Ok(rv)
    } else {
        Err(Error::ParseFailed("data not consumed entirely when explicitly deserializing"))
    }
}

/// Deserializes an object from a vector, but will not report an error if said deserialization
/// doesn't consume the entire vector.
pub fn deserialize_partial<T: Decodable>(data: &[u8]) -> Result<(T, usize), Error> {
    let mut decoder = Cursor::new(data);
    let rv = T::consensus_decode(&mut decoder)?;
    let consumed = decoder.position() as usize;

    Ok((rv, consumed))
}

/// Data which can be encoded in a consensus-consistent way.
pub trait Encodable {
    /// Encodes an object with a well-defined format.
    ///
    /// Returns the number of bytes written on success.
    fn consensus_encode<W: Write + ?Sized>(&self, writer: &mut W) -> Result<usize, io::Error>;
}

/// Data which can be decoded in a consensus-consistent way.
pub trait Decodable: Sized {
    /// Decodes an object with a well-defined format.
    fn consensus_decode<R: Read + ?Sized>(reader: &mut R) -> Result<Self, Error>;
}

/// A variable-length unsigned integer, Bitcoin's "compact size".
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Debug)]
pub struct VarInt(pub u64);

impl VarInt {
    /// Gets the length of this VarInt when encoded.
    ///
    /// Returns 1 for 0..=0xFC, 3 for 0xFD..=(2^16-1), 5 for 0x10000..=(2^32-1),
    /// and 9 otherwise.
    #[inline]
    pub const fn size(&self) -> usize {
        match self.0 {
            0..=0xFC => 1,
            0xFD..=0xFFFF => 3,
            0x10000..=0xFFFFFFFF => 5,
            _ => 9,
        }
    }
}

impl Encodable for VarInt {
    fn consensus_encode<W: Write + ?Sized>(&self, w: &mut W) -> Result<usize, io::Error> {
        match self.0 {
            0..=0xFC => {
                (self.0 as u8).consensus_encode(w)?;
                Ok(1)
            }
            0xFD..=0xFFFF => {
                w.write_all(&[0xFD])?;
                (self.0 as u16).consensus_encode(w)?;
                Ok(3)
            }
            0x10000..=0xFFFFFFFF => {
                w.write_all(&[0xFE])?;
                (self.0 as u32).consensus_encode(w)?;
                Ok(5)
            }
            _ => {
                w.write_all(&[0xFF])?;
                self.0.consensus_encode(w)?;
                Ok(9)
            }
        }
    }
}

impl Decodable for VarInt {
    fn consensus_decode<R: Read + ?Sized>(r: &mut R) -> Result<Self, Error> {
        let n = u8::consensus_decode(r)?;
        match n {
            0xFF => {
                let x = u64::consensus_decode(r)?;
                if x < 0x100000000 { Err(Error::NonMinimalVarInt) } else { Ok(VarInt(x)) }
            }
            0xFE => {
                let x = u32::consensus_decode(r)?;
                if x < 0x10000 { Err(Error::NonMinimalVarInt) } else { Ok(VarInt(x as u64)) }
            }
            0xFD => {
                let x = u16::consensus_decode(r)?;
                if x < 0xFD { Err(Error::NonMinimalVarInt) } else { Ok(VarInt(x as u64)) }
            }
            n => Ok(VarInt(n as u64)),
        }
    }
}

macro_rules! impl_int_encodable {
    ($ty:ident, $len:expr) => {
        impl Encodable for $ty {
            #[inline]
            fn consensus_encode<W: Write + ?Sized>(&self, w: &mut W) -> Result<usize, io::Error> {
                w.write_all(&self.to_le_bytes())?;
                Ok($len)
            }
        }

        impl Decodable for $ty {
            #[inline]
            fn consensus_decode<R: Read + ?Sized>(r: &mut R) -> Result<Self, Error> {
                let mut buf = [0u8; $len];
                r.read_exact(&mut buf)?;
                Ok($ty::from_le_bytes(buf))
            }
        }
    };
}

impl_int_encodable!(u8, 1);
impl_int_encodable!(u16, 2);
impl_int_encodable!(u32, 4);
impl_int_encodable!(u64, 8);
impl_int_encodable!(i16, 2);
impl_int_encodable!(i32, 4);

impl Encodable for bool {
    #[inline]
    fn consensus_encode<W: Write + ?Sized>(&self, w: &mut W) -> Result<usize, io::Error> {
        (*self as u8).consensus_encode(w)
    }
}

impl Decodable for bool {
    #[inline]
    fn consensus_decode<R: Read + ?Sized>(r: &mut R) -> Result<Self, Error> {
        Ok(u8::consensus_decode(r)? != 0)
    }
}

impl<const N: usize> Encodable for [u8; N] {
    #[inline]
    fn consensus_encode<W: Write + ?Sized>(&self, w: &mut W) -> Result<usize, io::Error> {
        w.write_all(&self[..])?;
        Ok(N)
    }
}

impl<const N: usize> Decodable for [u8; N] {
    #[inline]
    fn consensus_decode<R: Read + ?Sized>(r: &mut R) -> Result<Self, Error> {
        let mut ret = [0u8; N];
        r.read_exact(&mut ret)?;
        Ok(ret)
    }
}

impl<T: Encodable> Encodable for Vec<T> {
    fn consensus_encode<W: Write + ?Sized>(&self, w: &mut W) -> Result<usize, io::Error> {
        let mut len = VarInt(self.len() as u64).consensus_encode(w)?;
        for item in self {
            len += item.consensus_encode(w)?;
        }
        Ok(len)
    }
}

impl<T: Decodable> Decodable for Vec<T> {
    fn consensus_decode<R: Read + ?Sized>(r: &mut R) -> Result<Self, Error> {
        let len = VarInt::consensus_decode(r)?.0 as usize;
        // Guard against absurd lengths before allocating; the element size is at least one byte.
        if len > MAX_VEC_SIZE {
            return Err(Error::OversizedVectorAllocation {
                requested: len,
                max: MAX_VEC_SIZE,
            });
        }
        let mut ret = Vec::with_capacity(len.min(1024));
        for _ in 0..len {
            ret.push(T::consensus_decode(r)?);
        }
        Ok(ret)
    }
}

/// Writes a dynamic bitset: the bit count as compact size followed by the packed bits,
/// least significant bit first.
pub fn write_dyn_bitset<W: Write + ?Sized>(w: &mut W, bits: &[bool]) -> Result<usize, io::Error> {
    let mut len = VarInt(bits.len() as u64).consensus_encode(w)?;
    let mut bytes = vec![0u8; bits.len().div_ceil(8)];
    for (i, bit) in bits.iter().enumerate() {
        if *bit {
            bytes[i / 8] |= 1 << (i % 8);
        }
    }
    w.write_all(&bytes)?;
    len += bytes.len();
    Ok(len)
}

/// Reads a dynamic bitset written by [`write_dyn_bitset`].
///
/// Padding bits past the declared size must be zero.
pub fn read_dyn_bitset<R: Read + ?Sized>(r: &mut R) -> Result<Vec<bool>, Error> {
    let size = VarInt::consensus_decode(r)?.0 as usize;
    if size > MAX_BITSET_SIZE {
        return Err(Error::OversizedVectorAllocation {
            requested: size,
            max: MAX_BITSET_SIZE,
        });
    }
    let mut bytes = vec![0u8; size.div_ceil(8)];
    r.read_exact(&mut bytes)?;

    let bits: Vec<bool> = (0..size).map(|i| bytes[i / 8] & (1 << (i % 8)) != 0).collect();

    for i in size..bytes.len() * 8 {
        if bytes[i / 8] & (1 << (i % 8)) != 0 {
            return Err(Error::ParseFailed("out-of-range bits set in bitset"));
        }
    }
    Ok(bits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn varint_boundaries_use_minimal_encoding() {
        assert_eq!(serialize(&VarInt(0xFC)), vec![0xFC]);
        assert_eq!(serialize(&VarInt(0xFD)), vec![0xFD, 0xFD, 0x00]);
        assert_eq!(serialize(&VarInt(0x10000)), vec![0xFE, 0x00, 0x00, 0x01, 0x00]);
        assert_eq!(VarInt(0x1_0000_0000).size(), 9);
    }

    #[test]
    fn non_minimal_varint_is_rejected() {
        let res: Result<VarInt, _> = deserialize(&[0xFD, 0x10, 0x00]);
        assert_matches!(res, Err(Error::NonMinimalVarInt));
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let res: Result<u16, _> = deserialize(&[0x01, 0x02, 0x03]);
        assert_matches!(res, Err(Error::ParseFailed(_)));
        let (value, consumed): (u16, usize) = deserialize_partial(&[0x01, 0x02, 0x03]).unwrap();
        assert_eq!(value, 0x0201);
        assert_eq!(consumed, 2);
    }

    #[test]
    fn bitset_packs_lsb_first() {
        let bits = vec![true, false, true, true, false, false, false, false, true];
        let mut out = Vec::new();
        let written = write_dyn_bitset(&mut out, &bits).unwrap();
        assert_eq!(written, 3);
        assert_eq!(out, vec![9, 0b0000_1101, 0b0000_0001]);

        let decoded = read_dyn_bitset(&mut Cursor::new(out)).unwrap();
        assert_eq!(decoded, bits);
    }

    #[test]
    fn bitset_with_padding_bits_set_is_rejected() {
        // three bits declared, but bit 5 of the single byte is set
        let res = read_dyn_bitset(&mut Cursor::new(vec![3u8, 0b0010_0001]));
        assert_matches!(res, Err(Error::ParseFailed(_)));
    }

    #[test]
    fn oversized_vector_is_rejected_before_allocation() {
        let data = serialize(&VarInt(MAX_VEC_SIZE as u64 + 1));
        let res: Result<Vec<u8>, _> = deserialize(&data);
        assert_matches!(res, Err(Error::OversizedVectorAllocation { .. }));
    }
}
