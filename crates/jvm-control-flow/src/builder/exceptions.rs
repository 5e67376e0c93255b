// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

//! Exception table normalisation and try declaration insertion.

use crate::{
    basic_block::{BasicBlock, BlockId, BlockRef, BlockType, ExceptionHandler, RawType},
    control_flow_graph::ControlFlowGraph,
    error::MalformedInput,
    options::BuilderOptions,
};
use jvm_bytecode_model::{ConstantPool, ExceptionTableEntry};
use log::debug;
use std::collections::BTreeMap;

/// One protected code range with all handlers guarding it, in table order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ProtectedRange {
    pub start: u32,
    pub end: u32,
    pub handlers: Vec<HandlerSpec>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct HandlerSpec {
    pub handler: u32,
    /// Caught classes; a single `None` marks a catch-all.
    pub catch_types: Vec<Option<u16>>,
}

impl HandlerSpec {
    fn is_finally(&self) -> bool {
        self.catch_types.first() == Some(&None)
    }
}

impl ProtectedRange {
    /// Whether `block` is real code inside the range.
    fn contains(&self, block: &BasicBlock) -> bool {
        matches!(block.block_type, BlockType::Raw(t) if t != RawType::TryDeclaration)
            && self.start <= block.from_offset
            && block.from_offset < self.end
    }
}

/// Groups exception table rows into protected ranges, ordered outermost first.
pub(crate) fn normalise(
    table: &[ExceptionTableEntry],
    options: &BuilderOptions,
) -> Vec<ProtectedRange> {
    let mut ranges: Vec<ProtectedRange> = vec![];
    for entry in table {
        if entry.start <= entry.handler && entry.handler < entry.end {
            debug!(
                "[normalise] dropping range {}..{} that protects its own handler {}",
                entry.start, entry.end, entry.handler
            );
            continue;
        }
        let pos = match ranges
            .iter()
            .position(|r| r.start == entry.start && r.end == entry.end)
        {
            Some(pos) => pos,
            None => {
                ranges.push(ProtectedRange {
                    start: entry.start,
                    end: entry.end,
                    handlers: vec![],
                });
                ranges.len() - 1
            }
        };
        let range = &mut ranges[pos];
        let mergeable = options.merge_multi_catch && entry.catch_type.is_some();
        match range
            .handlers
            .iter_mut()
            .find(|h| mergeable && h.handler == entry.handler && !h.is_finally())
        {
            Some(handler) => handler.catch_types.push(entry.catch_type),
            None => range.handlers.push(HandlerSpec {
                handler: entry.handler,
                catch_types: vec![entry.catch_type],
            }),
        }
    }
    if options.fold_finally_ranges {
        fold_finally_ranges(&mut ranges);
    }
    ranges.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));
    ranges
}

/// javac protects every catch body with the try's `finally` handler through a range of its
/// own. Those ranges are dropped so the catch bodies stay handlers of a single try.
fn fold_finally_ranges(ranges: &mut Vec<ProtectedRange>) {
    let guarded: Vec<(u32, Vec<u32>)> = ranges
        .iter()
        .filter_map(|range| {
            let finally = range.handlers.iter().find(|h| h.is_finally())?;
            let catches: Vec<u32> = range
                .handlers
                .iter()
                .filter(|h| !h.is_finally())
                .map(|h| h.handler)
                .collect();
            (!catches.is_empty()).then_some((finally.handler, catches))
        })
        .collect();
    ranges.retain(|range| {
        let only_finally = range.handlers.len() == 1 && range.handlers[0].is_finally();
        if !only_finally {
            return true;
        }
        let finally = range.handlers[0].handler;
        let folded = guarded
            .iter()
            .any(|(handler, catches)| *handler == finally && catches.contains(&range.start));
        if folded {
            debug!(
                "[fold_finally_ranges] folding range {}..{} into its try",
                range.start, range.end
            );
        }
        !folded
    });
}

fn catch_name(constants: Option<&dyn ConstantPool>, index: u16) -> String {
    constants
        .and_then(|pool| pool.class_name(index))
        .map_or_else(|| format!("#{}", index), str::to_string)
}

/// Inserts one try declaration per range ahead of the range's first block. The declaration
/// takes over every edge into that block from outside the range.
pub(crate) fn insert_try_declarations(
    graph: &mut ControlFlowGraph,
    ranges: &[ProtectedRange],
    block_at: &BTreeMap<u32, BlockId>,
    constants: Option<&dyn ConstantPool>,
) -> Result<(), MalformedInput> {
    for range in ranges {
        let target = *block_at
            .get(&range.start)
            .ok_or(MalformedInput::InvalidExceptionRange {
                start: range.start,
                end: range.end,
            })?;
        let mut handlers = vec![];
        for spec in &range.handlers {
            let handler = *block_at
                .get(&spec.handler)
                .ok_or(MalformedInput::DanglingHandler {
                    handler: spec.handler,
                })?;
            let mut names = spec
                .catch_types
                .iter()
                .flatten()
                .map(|index| catch_name(constants, *index));
            handlers.push(ExceptionHandler {
                throwable_name: names.next(),
                other_throwable_names: names.collect(),
                handler: BlockRef::Block(handler),
            });
        }
        let declaration = graph.add_block(
            BlockType::Raw(RawType::TryDeclaration),
            range.start,
            range.start,
        );
        graph.redirect_filtered(target, BlockRef::Block(declaration), |pred| {
            !range.contains(pred)
        });
        graph.update(declaration, |block| {
            block.next = Some(BlockRef::Block(target));
            block.exception_handlers = handlers;
        });
        debug!(
            "[insert_try_declarations] block {} declares {}..{} ahead of block {}",
            declaration, range.start, range.end, target
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(start: u32, end: u32, handler: u32, catch_type: Option<u16>) -> ExceptionTableEntry {
        ExceptionTableEntry {
            start,
            end,
            handler,
            catch_type,
        }
    }

    #[test]
    fn test_catch_finally_table_folds_to_one_range() {
        // try { 0..10 } catch (#5) { 13..20 } finally { 23.. }
        let table = vec![
            entry(0, 10, 13, Some(5)),
            entry(0, 10, 23, None),
            entry(13, 20, 23, None),
            entry(23, 25, 23, None),
        ];
        let ranges = normalise(&table, &BuilderOptions::default());
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].handlers.len(), 2);
        assert!(ranges[0].handlers[1].is_finally());

        let unfolded = normalise(
            &table,
            &BuilderOptions {
                fold_finally_ranges: false,
                ..BuilderOptions::default()
            },
        );
        assert_eq!(unfolded.len(), 2);
    }

    #[test]
    fn test_multi_catch_rows_merge() {
        let table = vec![entry(0, 10, 13, Some(5)), entry(0, 10, 13, Some(7))];
        let ranges = normalise(&table, &BuilderOptions::default());
        assert_eq!(ranges[0].handlers.len(), 1);
        assert_eq!(ranges[0].handlers[0].catch_types, vec![Some(5), Some(7)]);

        let separate = normalise(
            &table,
            &BuilderOptions {
                merge_multi_catch: false,
                ..BuilderOptions::default()
            },
        );
        assert_eq!(separate[0].handlers.len(), 2);
    }

    #[test]
    fn test_outer_ranges_sort_first() {
        let table = vec![entry(4, 8, 20, Some(1)), entry(0, 12, 30, Some(2)), entry(4, 16, 40, Some(3))];
        let ranges = normalise(&table, &BuilderOptions::default());
        let bounds: Vec<(u32, u32)> = ranges.iter().map(|r| (r.start, r.end)).collect();
        assert_eq!(bounds, vec![(0, 12), (4, 16), (4, 8)]);
    }
}
