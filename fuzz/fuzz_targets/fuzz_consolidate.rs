#![no_main]

use libfuzzer_sys::fuzz_target;

// Accepts arbitrary bytes, attempts to parse as a document, feeds it through
// analyze() and consolidate(). Goal: no panics, and every successful
// consolidation adds no dangling reference.
fuzz_target!(|data: &[u8]| {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };
    let Ok(document) = schema_consolidate_core::SchemaDocument::from_value(value) else {
        return;
    };
    let options = schema_consolidate_core::ConsolidateOptions::default();
    let _ = schema_consolidate_core::analyze(&document, &options);
    if let Ok(result) = schema_consolidate_core::consolidate(&document, &options) {
        let before = document.dangling_references().len();
        assert!(result.document.dangling_references().len() <= before);
    }
});
