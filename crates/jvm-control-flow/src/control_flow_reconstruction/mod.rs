// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

//! Control flow reconstruction module
//!
//! This module rewrites the raw block graph of a method into nested structured blocks
//! (conditions, if/else, loops, switches, try blocks) by repeatedly applying local rewrite
//! rules until every reachable block is structured. Jumps no rule can express are kept as
//! literal gotos.

mod branches;
mod conditions;
mod dominance;
mod escape;
mod helpers;
mod jumps;
mod loops;
mod reconstructor;
mod switches;
mod tries;

pub use reconstructor::{structure_graph, StructuringReport};
