// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Lossless serde form for `f64`.
//!
//! JSON has no NaN or infinity, and serde_json writes them as `null`.
//! Finite values stay numbers; non-finite values are written as text:
//! `"NaN"`, `"Infinity"`, `"-Infinity"`, or `"NaN:0x<bits>"` for a NaN
//! with a non-canonical payload.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum Repr {
    Number(f64),
    Text(String),
}

fn to_text(v: f64) -> String {
    if v.is_nan() {
        if v.to_bits() == f64::NAN.to_bits() {
            "NaN".to_string()
        } else {
            format!("NaN:0x{:016x}", v.to_bits())
        }
    } else if v > 0.0 {
        "Infinity".to_string()
    } else {
        "-Infinity".to_string()
    }
}

fn from_text(text: &str) -> Option<f64> {
    match text {
        "NaN" => Some(f64::NAN),
        "Infinity" => Some(f64::INFINITY),
        "-Infinity" => Some(f64::NEG_INFINITY),
        _ => text
            .strip_prefix("NaN:0x")
            .and_then(|hex| u64::from_str_radix(hex, 16).ok())
            .map(f64::from_bits)
            .filter(|v| v.is_nan()),
    }
}

impl Repr {
    fn into_f64<E: serde::de::Error>(self) -> Result<f64, E> {
        match self {
            Repr::Number(v) => Ok(v),
            Repr::Text(t) => from_text(&t).ok_or_else(|| E::custom(format!("invalid float {t:?}"))),
        }
    }
}

pub(crate) fn serialize<S: Serializer>(v: &f64, s: S) -> Result<S::Ok, S::Error> {
    if v.is_finite() {
        s.serialize_f64(*v)
    } else {
        s.serialize_str(&to_text(*v))
    }
}

pub(crate) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    Repr::deserialize(d)?.into_f64()
}

/// The same encoding for every element of a sequence
pub(crate) mod list {
    use super::*;

    struct Element(f64);

    impl Serialize for Element {
        fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
            super::serialize(&self.0, s)
        }
    }

    pub(crate) fn serialize<S: Serializer>(v: &[f64], s: S) -> Result<S::Ok, S::Error> {
        s.collect_seq(v.iter().map(|x| Element(*x)))
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<f64>, D::Error> {
        Vec::<Repr>::deserialize(d)?
            .into_iter()
            .map(|r| r.into_f64::<D::Error>())
            .collect()
    }
}
