//! Criterion benchmarks for the schema-consolidate-core pipeline.
//!
//! Fixtures are parsed outside the benchmark loop to measure only the
//! classification and rewriting logic, not JSON parsing or file I/O.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::{json, Map, Value};
use std::fs;
use std::path::Path;

use schema_consolidate_core::{analyze, consolidate, ConsolidateOptions, SchemaDocument};

/// Load and parse a fixture document from the shared test fixtures directory.
fn load_fixture(name: &str) -> SchemaDocument {
    let fixtures_dir = concat!(env!("CARGO_MANIFEST_DIR"), "/../../tests/documents");
    let path = Path::new(fixtures_dir).join(name);
    let content = fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("Failed to read fixture {}: {}", path.display(), e));
    SchemaDocument::from_json_str(&content)
        .unwrap_or_else(|e| panic!("Failed to parse fixture {}: {}", path.display(), e))
}

/// A wide document: `n` response wrappers in `n / 10` shapes, each used by
/// one operation.
fn synthetic_document(n: usize) -> SchemaDocument {
    let mut schemas = Map::new();
    let mut paths = Map::new();
    for i in 0..n {
        let name = format!("Get{i}ResponseDto");
        schemas.insert(
            name.clone(),
            json!({
                "type": "object",
                "description": format!("operation {i}"),
                "properties": { "response": { "type": "object", "properties": {
                    format!("field{}", i % (n / 10).max(1)): { "type": "string" }
                } } }
            }),
        );
        paths.insert(
            format!("/op/{i}"),
            json!({ "get": { "responses": { "200": { "content": { "application/json": {
                "schema": { "$ref": format!("#/components/schemas/{name}") }
            } } } } } }),
        );
    }
    SchemaDocument::from_value(json!({
        "openapi": "3.0.3",
        "paths": Value::Object(paths),
        "components": { "schemas": Value::Object(schemas) }
    }))
    .unwrap()
}

fn bench_analyze_fixture(c: &mut Criterion) {
    let document = load_fixture("sample-api.json");
    let options = ConsolidateOptions::default();

    c.bench_function("analyze/sample_api", |b| {
        b.iter(|| analyze(black_box(&document), black_box(&options)).unwrap())
    });
}

fn bench_consolidate_fixture(c: &mut Criterion) {
    let document = load_fixture("sample-api.json");
    let options = ConsolidateOptions::default();

    c.bench_function("consolidate/sample_api", |b| {
        b.iter(|| consolidate(black_box(&document), black_box(&options)).unwrap())
    });
}

fn bench_consolidate_wide(c: &mut Criterion) {
    let document = synthetic_document(500);
    let options = ConsolidateOptions::default();

    c.bench_function("consolidate/wide_500", |b| {
        b.iter(|| consolidate(black_box(&document), black_box(&options)).unwrap())
    });
}

criterion_group!(
    benches,
    bench_analyze_fixture,
    bench_consolidate_fixture,
    bench_consolidate_wide,
);
criterion_main!(benches);
