// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

use anyhow::{anyhow, bail};
use jvm_control_flow::{
    build_graph, invariants::verify_graph, listing::parse_listing, outline::outline,
    structure_graph, BlockRef, Options,
};
use regex::Regex;
use std::{collections::BTreeSet, path::Path};

// Extracts the text after `start` from every line beginning with it. Use as in
// `extract_test_directives(&content, "# expect:")`.
fn extract_test_directives(content: &str, start: &str) -> Vec<String> {
    let rex = Regex::new(&format!("(?m)^\\s*{}(?P<ann>.*?)$", start)).unwrap();
    rex.captures_iter(content)
        .map(|cap| cap.name("ann").unwrap().as_str().trim().to_string())
        .collect()
}

fn check_listing(path: &Path) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(path)?;
    let options = Options::from_toml_str(
        &extract_test_directives(&content, "# option:").join("\n"),
    )?;
    let listing = parse_listing(&content)?;

    let mut graph = build_graph(&listing.body, Some(&listing.constants), &options.builder)?;
    verify_graph(&graph)?;
    let report = structure_graph(&mut graph, &options)?;
    let text = outline(&graph);

    let types: BTreeSet<&str> = graph
        .reachable()
        .into_iter()
        .map(|id| graph.block(id).block_type.name())
        .collect();
    for expected in extract_test_directives(&content, "# expect:") {
        if !types.contains(expected.as_str()) {
            bail!("expected a {} block in\n{}", expected, text);
        }
    }
    for unexpected in extract_test_directives(&content, "# expect-not:") {
        if types.contains(unexpected.as_str()) {
            bail!("unexpected {} block in\n{}", unexpected, text);
        }
    }

    for id in graph.reachable() {
        let mut seen = BTreeSet::from([id]);
        let mut cursor = graph.block(id).next;
        while let Some(BlockRef::Block(next)) = cursor {
            if !seen.insert(next) {
                bail!("`next` edges from #{} run in a circle in\n{}", id, text);
            }
            cursor = graph.block(next).next;
        }
    }

    let again = structure_graph(&mut graph, &options)?;
    if again.rewrites != 0 {
        return Err(anyhow!(
            "a structured graph was rewritten {} more times (first run: {:?})",
            again.rewrites,
            report.applied
        ));
    }
    Ok(())
}

fn test_runner(path: &Path) -> datatest_stable::Result<()> {
    check_listing(path)?;
    Ok(())
}

datatest_stable::harness! {
    { test = test_runner, root = "tests/structuring", pattern = r".*\.jbc" },
}
