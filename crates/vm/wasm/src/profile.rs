// Path: crates/vm/wasm/src/profile.rs
//! Static opcode accounting for gas profiles and traces.

use artifex_types::result::TraceEntry;
use std::collections::BTreeMap;

/// Builds a histogram of the module body's opcodes, keyed by mnemonic.
///
/// The histogram is derived from the module text, not from the dynamic
/// instruction stream; it is deterministic for a given artifact and cheap
/// enough to compute on request.
pub fn opcode_histogram(module_bytes: &[u8]) -> BTreeMap<String, u64> {
    let mut counts: BTreeMap<String, u64> = BTreeMap::new();
    let parser = wasmparser::Parser::new(0);
    for payload in parser.parse_all(module_bytes) {
        let Ok(wasmparser::Payload::CodeSectionEntry(body)) = payload else {
            continue;
        };
        let Ok(mut reader) = body.get_operators_reader() else {
            continue;
        };
        while !reader.eof() {
            match reader.read() {
                Ok(op) => *counts.entry(mnemonic(&op)).or_insert(0) += 1,
                Err(_) => break,
            }
        }
    }
    counts
}

/// The histogram as ordered trace entries.
pub fn trace_entries(module_bytes: &[u8]) -> Vec<TraceEntry> {
    opcode_histogram(module_bytes)
        .into_iter()
        .map(|(op, count)| TraceEntry { op, count })
        .collect()
}

/// Extracts the operator name from its debug form (`LocalGet { .. }` ->
/// `LocalGet`).
fn mnemonic(op: &wasmparser::Operator<'_>) -> String {
    let debug = format!("{:?}", op);
    debug
        .split(|c: char| c == ' ' || c == '{')
        .next()
        .unwrap_or("Unknown")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn histogram_counts_body_opcodes() {
        let bytes = wat::parse_str(
            r#"(module (func (export "two") (result i32)
                (i32.add (i32.const 1) (i32.const 1))))"#,
        )
        .unwrap();
        let counts = opcode_histogram(&bytes);
        assert_eq!(counts.get("I32Const"), Some(&2));
        assert_eq!(counts.get("I32Add"), Some(&1));
    }

    #[test]
    fn trace_entries_are_sorted_by_mnemonic() {
        let bytes = wat::parse_str(
            r#"(module (func (export "one") (result i32) (i32.const 7)))"#,
        )
        .unwrap();
        let entries = trace_entries(&bytes);
        assert!(!entries.is_empty());
        let mut sorted = entries.clone();
        sorted.sort_by(|a, b| a.op.cmp(&b.op));
        assert_eq!(
            entries.iter().map(|e| &e.op).collect::<Vec<_>>(),
            sorted.iter().map(|e| &e.op).collect::<Vec<_>>()
        );
    }
}
