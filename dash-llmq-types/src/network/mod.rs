// SPDX-License-Identifier: CC0-1.0

//! Dash network support.
//!
//! Messages exchanged between masternodes to recover quorum data.

pub mod message_qdata;
