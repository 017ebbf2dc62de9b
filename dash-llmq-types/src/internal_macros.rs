// SPDX-License-Identifier: CC0-1.0

//! Internal macros.
//!
//! Macros meant to be used inside this crate only.

/// Implements standard consensus encoding for a struct by encoding each listed field in order.
macro_rules! impl_consensus_encoding {
    ($thing:ident, $($field:ident),+) => (
        impl $crate::consensus::Encodable for $thing {
            #[inline]
            fn consensus_encode<W: std::io::Write + ?Sized>(
                &self,
                w: &mut W,
            ) -> Result<usize, std::io::Error> {
                let mut len = 0;
                $(len += $crate::consensus::Encodable::consensus_encode(&self.$field, w)?;)+
                Ok(len)
            }
        }

        impl $crate::consensus::Decodable for $thing {
            #[inline]
            fn consensus_decode<R: std::io::Read + ?Sized>(
                r: &mut R,
            ) -> Result<$thing, $crate::consensus::encode::Error> {
                Ok($thing {
                    $($field: $crate::consensus::Decodable::consensus_decode(r)?),+
                })
            }
        }
    );
}
pub(crate) use impl_consensus_encoding;

/// Implements consensus encoding for a hash newtype as its raw 32 bytes.
macro_rules! impl_hashencode {
    ($hashtype:ident) => {
        impl $crate::consensus::Encodable for $hashtype {
            fn consensus_encode<W: std::io::Write + ?Sized>(
                &self,
                w: &mut W,
            ) -> Result<usize, std::io::Error> {
                $crate::consensus::Encodable::consensus_encode(
                    bitcoin_hashes::Hash::as_byte_array(self),
                    w,
                )
            }
        }

        impl $crate::consensus::Decodable for $hashtype {
            fn consensus_decode<R: std::io::Read + ?Sized>(
                r: &mut R,
            ) -> Result<Self, $crate::consensus::encode::Error> {
                Ok(<$hashtype as bitcoin_hashes::Hash>::from_byte_array(
                    <<$hashtype as bitcoin_hashes::Hash>::Bytes as $crate::consensus::Decodable>::consensus_decode(r)?,
                ))
            }
        }
    };
}
pub(crate) use impl_hashencode;

/// Implements `Display`, `LowerHex` and byte conversions for a fixed-size byte newtype.
macro_rules! impl_bytes_newtype {
    ($t:ident, $len:literal) => {
        impl $t {
            /// Number of bytes in the encoded form.
            pub const SIZE: usize = $len;

            /// Creates the value from raw bytes.
            pub const fn from_bytes(bytes: [u8; $len]) -> Self {
                $t(bytes)
            }

            /// Returns the raw bytes.
            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            /// Returns `true` if every byte is zero.
            pub fn is_zeroed(&self) -> bool {
                self.0.iter().all(|b| *b == 0)
            }
        }

        impl std::fmt::LowerHex for $t {
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str(&hex::encode(self.0))
            }
        }

        impl std::fmt::Display for $t {
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                std::fmt::LowerHex::fmt(self, f)
            }
        }

        impl From<[u8; $len]> for $t {
            fn from(bytes: [u8; $len]) -> Self {
                $t(bytes)
            }
        }

        impl TryFrom<&[u8]> for $t {
            type Error = $crate::consensus::encode::Error;

            fn try_from(data: &[u8]) -> Result<Self, Self::Error> {
                let bytes: [u8; $len] = data
                    .try_into()
                    .map_err(|_| $crate::consensus::encode::Error::ParseFailed("invalid length"))?;
                Ok($t(bytes))
            }
        }

        impl std::str::FromStr for $t {
            type Err = hex::FromHexError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let mut bytes = [0u8; $len];
                hex::decode_to_slice(s, &mut bytes)?;
                Ok($t(bytes))
            }
        }

        impl $crate::consensus::Encodable for $t {
            fn consensus_encode<W: std::io::Write + ?Sized>(
                &self,
                w: &mut W,
            ) -> Result<usize, std::io::Error> {
                $crate::consensus::Encodable::consensus_encode(&self.0, w)
            }
        }

        impl $crate::consensus::Decodable for $t {
            fn consensus_decode<R: std::io::Read + ?Sized>(
                r: &mut R,
            ) -> Result<Self, $crate::consensus::encode::Error> {
                Ok($t(<[u8; $len] as $crate::consensus::Decodable>::consensus_decode(r)?))
            }
        }
    };
}
pub(crate) use impl_bytes_newtype;
