// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Array element types, written in the `<byteorder><kind><size>` notation
//! used by Zarr and NumPy (`">f4"`, `"<i8"`, `"|u1"`, `"|S1"`).

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Bool,
    /// Single byte character, as in legacy `char` arrays
    Char,
}

impl ScalarKind {
    pub const fn item_size(&self) -> u64 {
        match self {
            ScalarKind::I8 | ScalarKind::U8 | ScalarKind::Bool | ScalarKind::Char => 1,
            ScalarKind::I16 | ScalarKind::U16 => 2,
            ScalarKind::I32 | ScalarKind::U32 | ScalarKind::F32 => 4,
            ScalarKind::I64 | ScalarKind::U64 | ScalarKind::F64 => 8,
        }
    }

    const fn code(&self) -> &'static str {
        match self {
            ScalarKind::I8 => "i1",
            ScalarKind::I16 => "i2",
            ScalarKind::I32 => "i4",
            ScalarKind::I64 => "i8",
            ScalarKind::U8 => "u1",
            ScalarKind::U16 => "u2",
            ScalarKind::U32 => "u4",
            ScalarKind::U64 => "u8",
            ScalarKind::F32 => "f4",
            ScalarKind::F64 => "f8",
            ScalarKind::Bool => "b1",
            ScalarKind::Char => "S1",
        }
    }

    fn from_code(code: &str) -> Option<Self> {
        Some(match code {
            "i1" => ScalarKind::I8,
            "i2" => ScalarKind::I16,
            "i4" => ScalarKind::I32,
            "i8" => ScalarKind::I64,
            "u1" => ScalarKind::U8,
            "u2" => ScalarKind::U16,
            "u4" => ScalarKind::U32,
            "u8" => ScalarKind::U64,
            "f4" => ScalarKind::F32,
            "f8" => ScalarKind::F64,
            "b1" => ScalarKind::Bool,
            "S1" => ScalarKind::Char,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    Big,
    Little,
    /// Single-byte types carry no order
    NotApplicable,
}

/// Element type of a virtual array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DataType {
    pub kind: ScalarKind,
    pub order: ByteOrder,
}

impl DataType {
    /// Big-endian type, the byte order of classic self-describing array files
    pub const fn big_endian(kind: ScalarKind) -> Self {
        let order = if kind.item_size() == 1 {
            ByteOrder::NotApplicable
        } else {
            ByteOrder::Big
        };
        Self { kind, order }
    }

    pub const fn little_endian(kind: ScalarKind) -> Self {
        let order = if kind.item_size() == 1 {
            ByteOrder::NotApplicable
        } else {
            ByteOrder::Little
        };
        Self { kind, order }
    }

    pub const fn item_size(&self) -> u64 {
        self.kind.item_size()
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let order = match self.order {
            ByteOrder::Big => '>',
            ByteOrder::Little => '<',
            ByteOrder::NotApplicable => '|',
        };
        write!(f, "{}{}", order, self.kind.code())
    }
}

impl FromStr for DataType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        let order = match chars.next() {
            Some('>') => ByteOrder::Big,
            Some('<') => ByteOrder::Little,
            Some('|') => ByteOrder::NotApplicable,
            _ => return Err(Error::InvalidDataType(s.to_string())),
        };
        let kind = ScalarKind::from_code(chars.as_str())
            .ok_or_else(|| Error::InvalidDataType(s.to_string()))?;

        let single_byte = kind.item_size() == 1;
        if single_byte != (order == ByteOrder::NotApplicable) {
            return Err(Error::InvalidDataType(s.to_string()));
        }
        Ok(Self { kind, order })
    }
}

impl TryFrom<String> for DataType {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DataType> for String {
    fn from(value: DataType) -> Self {
        value.to_string()
    }
}
