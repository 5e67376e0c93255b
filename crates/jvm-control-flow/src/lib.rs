// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

//! Control flow graphs for JVM methods: building the raw block graph from decoded bytecode and
//! rewriting it into nested structured blocks ready for source generation.

pub mod basic_block;
pub mod builder;
pub mod control_flow_graph;
pub mod control_flow_reconstruction;
pub mod error;
pub mod invariants;
pub mod listing;
pub mod options;
pub mod outline;

pub use basic_block::{BasicBlock, BlockId, BlockRef, BlockType, RawType, StructuredType};
pub use builder::build_graph;
pub use control_flow_graph::ControlFlowGraph;
pub use control_flow_reconstruction::{structure_graph, StructuringReport};
pub use error::{InvariantViolation, ListingError, MalformedInput, StructuringError};
pub use options::{BuilderOptions, Options};

use jvm_bytecode_model::{ConstantPool, MethodBody};
use log::{debug, warn};

/// The structured graph of one method and what the structurer did to get there.
#[derive(Clone, Debug)]
pub struct StructuredMethod {
    pub graph: ControlFlowGraph,
    pub report: StructuringReport,
}

/// Builds and structures the graph of one method.
pub fn structure_method(
    body: &MethodBody,
    constants: Option<&dyn ConstantPool>,
    options: &Options,
) -> Result<StructuredMethod, StructuringError> {
    let mut graph = build_graph(body, constants, &options.builder)?;
    let report = structure_graph(&mut graph, options)?;
    Ok(StructuredMethod { graph, report })
}

/// Structures each named method on its own. A failure is reported for its method and does not
/// stop the others.
pub fn structure_methods<'a>(
    methods: impl IntoIterator<Item = (&'a str, &'a MethodBody)>,
    constants: Option<&dyn ConstantPool>,
    options: &Options,
) -> Vec<(String, Result<StructuredMethod, StructuringError>)> {
    methods
        .into_iter()
        .map(|(name, body)| {
            let result = structure_method(body, constants, options);
            match &result {
                Ok(method) => debug!(
                    "[structure_methods] {}: {} rewrites, {} escapes",
                    name, method.report.rewrites, method.report.escapes
                ),
                Err(err) => warn!("[structure_methods] {}: {}", name, err),
            }
            (name.to_string(), result)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{basic_block::VirtualTarget, listing::parse_listing};
    use std::collections::BTreeSet;

    fn structure(text: &str) -> StructuredMethod {
        let listing = parse_listing(text).unwrap();
        structure_method(&listing.body, Some(&listing.constants), &Options::default()).unwrap()
    }

    fn types(graph: &ControlFlowGraph) -> BTreeSet<&'static str> {
        graph
            .reachable()
            .into_iter()
            .map(|id| graph.block(id).block_type.name())
            .collect()
    }

    fn find(graph: &ControlFlowGraph, block_type: StructuredType) -> &BasicBlock {
        graph
            .reachable()
            .into_iter()
            .map(|id| graph.block(id))
            .find(|block| block.block_type == BlockType::Structured(block_type))
            .unwrap()
    }

    fn edges_to(graph: &ControlFlowGraph, target: VirtualTarget) -> usize {
        graph
            .reachable()
            .into_iter()
            .flat_map(|id| graph.block(id).edges())
            .filter(|(_, to)| *to == BlockRef::Virtual(target))
            .count()
    }

    #[test]
    fn test_two_arms_with_one_join_become_if_else() {
        let method = structure(
            "
            0: iload_0
            1: ifeq 10
            4: iconst_1
            5: istore_1
            6: goto 12
            10: iconst_2
            11: istore_1
            12: return
            ",
        );
        let if_else = find(&method.graph, StructuredType::IfElse);
        assert!(if_else.condition.is_some());
        assert_eq!(edges_to(&method.graph, VirtualTarget::End), 2);
        assert_eq!(method.report.escapes, 0);
    }

    #[test]
    fn test_back_edge_becomes_loop() {
        let method = structure(
            "
            0: iconst_0
            1: istore_1
            2: iload_1
            3: bipush 10
            5: if_icmpge 14
            8: iinc 1 1
            11: goto 2
            14: return
            ",
        );
        let types = types(&method.graph);
        assert!(types.contains("LOOP"));
        assert!(!types.contains("GOTO"));
        assert_eq!(edges_to(&method.graph, VirtualTarget::LoopStart), 1);
        assert_eq!(method.report.escapes, 0);
    }

    #[test]
    fn test_jump_into_other_arm_becomes_goto() {
        // if (a) { if (b) goto inside; x = 1; } else { x = 2; inside: y = 3; } return;
        let method = structure(
            "
            0: iload_0
            1: ifeq 13
            4: iload_1
            5: ifne 15
            8: iconst_1
            9: istore_2
            10: goto 17
            13: iconst_2
            14: istore_2
            15: iconst_3
            16: istore_3
            17: return
            ",
        );
        assert_eq!(method.report.escapes, 1);
        let types = types(&method.graph);
        assert!(types.contains("IF_ELSE"));
        assert!(types.contains("GOTO"));
        assert_eq!(invariants::verify_structured(&method.graph), Ok(()));
    }

    #[test]
    fn test_two_entry_cycle_ends_in_infinite_goto() {
        // L4 is entered from the top and from the jump back at 11.
        let method = structure(
            "
            0: iload_0
            1: ifeq 8
            4: iload_1
            5: ifne 14
            8: iinc 1 1
            11: goto 4
            14: return
            ",
        );
        let graph = &method.graph;
        assert!(types(graph).contains("INFINITE_GOTO"));
        assert!(!types(graph).contains("LOOP"));
        assert_eq!(method.report.escapes, 3);
        for id in graph.reachable() {
            let mut seen = BTreeSet::from([id]);
            let mut cursor = graph.block(id).next;
            while let Some(BlockRef::Block(next)) = cursor {
                assert!(seen.insert(next), "`next` edges from #{} run in a circle", id);
                cursor = graph.block(next).next;
            }
        }
    }

    #[test]
    fn test_case_leading_to_join_needs_no_break() {
        // switch (x) { case 1: break; case 2: y = 1; } return;
        let method = structure(
            "
            0: iload_0
            1: lookupswitch 12 1:12 2:8
            8: iconst_1
            9: istore_1
            10: goto 12
            12: return
            ",
        );
        let switch = find(&method.graph, StructuredType::Switch);
        assert_eq!(switch.switch_cases.len(), 1);
        assert_eq!(switch.switch_cases[0].value, 2);
        assert_eq!(edges_to(&method.graph, VirtualTarget::SwitchBreak), 0);
        let body = switch.switch_cases[0].target.block().unwrap();
        assert_eq!(method.graph.block(body).next, Some(BlockRef::END));
    }

    #[test]
    fn test_finally_is_the_last_handler() {
        // try { x = 1; } catch (Exception e) { x = 2; } finally { x = 3; } return;
        let method = structure(
            "
            .catch 0 2 15 any
            .catch 0 2 7 java/lang/Exception
            .catch 7 10 15 any
            0: iconst_1
            1: istore_1
            2: iconst_3
            3: istore_1
            4: goto 20
            7: astore_2
            8: iconst_2
            9: istore_1
            10: iconst_3
            11: istore_1
            12: goto 20
            15: astore_3
            16: iconst_3
            17: istore_1
            18: aload_3
            19: athrow
            20: return
            ",
        );
        let try_block = find(&method.graph, StructuredType::Try);
        let handlers = &try_block.exception_handlers;
        assert_eq!(handlers.len(), 2);
        assert_eq!(
            handlers[0].throwable_name.as_deref(),
            Some("java/lang/Exception")
        );
        assert!(handlers[1].is_finally());
        assert!(try_block.sub1.is_some());
    }

    #[test]
    fn test_batch_reports_each_method() {
        let good = parse_listing("0: return").unwrap();
        let bad = parse_listing("0: iconst_0").unwrap();
        let results = structure_methods(
            [("good", &good.body), ("bad", &bad.body)],
            None,
            &Options::default(),
        );
        assert_eq!(results.len(), 2);
        assert!(results[0].1.is_ok());
        assert_eq!(
            results[1].1.as_ref().unwrap_err(),
            &StructuringError::Malformed(MalformedInput::FallsOffEnd { offset: 0 })
        );
    }
}
