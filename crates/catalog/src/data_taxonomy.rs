// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Data classes for credential material.
//!
//! The `#[taxonomy]` macro generates one wrapper per class, e.g.
//! `ApiKey<T>`. Wrappers print as `<refpond/api_key:REDACTED>` in `Debug`
//! output and serialize their payload unchanged. Call
//! `.as_declassified()` to read the value.

use data_privacy::taxonomy;

#[taxonomy(refpond)]
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum RefpondTaxonomy {
    /// Access key ids and other identifiers used to authenticate
    ApiKey,

    /// Secret access keys and session tokens
    ApiSecret,
}
