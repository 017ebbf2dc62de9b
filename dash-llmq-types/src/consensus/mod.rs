// SPDX-License-Identifier: CC0-1.0

//! Dash consensus.
//!
//! This module defines structures, functions, and traits that are needed to
//! conform to Dash consensus wire and storage encoding.

pub mod encode;

pub use self::encode::{
    Decodable, Encodable, VarInt, deserialize, deserialize_partial, serialize, serialize_hex,
};
