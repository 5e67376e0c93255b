// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

/// Options controlling how exception tables are turned into try declarations.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuilderOptions {
    /// Drop the protected ranges javac emits for catch bodies guarded by the same `finally`
    /// handler as their try, so that the catch bodies stay inside one try declaration.
    pub fold_finally_ranges: bool,
    /// Merge exception table rows that share a range and a handler into one multi-catch
    /// handler. When off, each row gets its own handler entry.
    pub merge_multi_catch: bool,
}

impl Default for BuilderOptions {
    fn default() -> Self {
        Self {
            fold_finally_ranges: true,
            merge_multi_catch: true,
        }
    }
}

/// Options for building and structuring one method. Usually read from a toml source.
///
/// NOTE: any fields carrying structured data must appear at the end for making
/// toml printing work.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Options {
    /// Structuring gives up after this many rounds per block of the initial graph.
    pub round_limit_factor: usize,
    /// Check all graph invariants after every rewrite instead of only at the end.
    pub verify_each_step: bool,
    /// Replace empty `return` blocks shared by several predecessors with the `RETURN` virtual
    /// target before structuring.
    pub return_sentinel: bool,

    /// BEGIN OF STRUCTURED OPTIONS. DO NOT ADD VALUE FIELDS AFTER THIS
    /// Options for the CFG builder.
    pub builder: BuilderOptions,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            round_limit_factor: 8,
            verify_each_step: false,
            return_sentinel: false,
            builder: BuilderOptions::default(),
        }
    }
}

impl Options {
    pub fn from_toml_str(source: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(source)
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string(self)
    }
}
