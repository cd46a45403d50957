// SPDX-FileCopyrightText: 2025 2025 Contributors to the AVCodec buffer manager project.
// SPDX-License-Identifier: Apache-2.0

//! Hardware codec capability model.
//!
//! A platform describes what its codecs can do in an XML capability
//! descriptor. This module reads that descriptor into [`CapabilityData`]
//! records and validates requested formats against them.
//!
//! # Key Types
//!
//! - [`CapabilityParser`]: Reads a descriptor into records (`load_configuration` / `parse`)
//! - [`CapabilityData`]: One codec's advertised configuration space
//! - [`CapabilityList`]: Indexed, read-only record set with format admission
//! - [`VideoCaps`] / [`AudioCaps`]: Derived per-codec helpers
//! - [`Range`] / [`Size`]: The `"min-max"` and `"WxH"` descriptor tokens

pub mod caps;
pub mod data;
pub mod list;
pub mod parser;
pub mod range;
pub mod tables;

pub use caps::{AudioCaps, VideoCaps};
pub use data::{CapabilityData, CodecType};
pub use list::CapabilityList;
pub use parser::{CapabilityParser, FieldDiagnostic};
pub use range::{Range, Size};
