//! Introspection never panics, whatever the input

use bridgemcp::{
    introspect::{scan, schema, templates},
    multiplexer::{frame, line_buffer::LineAssembler},
    SourceIntrospector,
};
use proptest::prelude::*;

mod helpers;
use helpers::*;

/// Source-like text: fragments of real generated servers mixed with noise
fn source_like() -> impl Strategy<Value = String> {
    let known = prop::sample::select(vec![
        "name=\"get_posts\"",
        "inputSchema={",
        "inputSchema: {",
        "f\"{API_BASE_URL}/posts/{",
        "`${API_BASE_URL}/users/${args.",
        "case \"",
        "elif name == \"",
        "@server.call_tool()\n",
        "uri=AnyUrl(\"",
        "\"\"\"",
        "}])",
        "\\",
    ])
    .prop_map(str::to_string);
    let fragments = prop_oneof![known, "[ -~]{0,12}", "\\PC{0,4}"];
    prop::collection::vec(fragments, 0..40).prop_map(|parts| parts.concat())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn parse_never_panics(source in source_like()) {
        let registry = SourceIntrospector::parse(&source);
        for tool in registry.tools() {
            prop_assert!(registry.template(&tool.name).is_some());
            prop_assert!(tool.input_schema.is_object());
        }
    }

    #[test]
    fn parse_never_panics_on_arbitrary_text(source in "\\PC{0,512}") {
        SourceIntrospector::parse(&source);
    }

    #[test]
    fn scanners_never_panic(text in source_like(), at in 0usize..256) {
        let at = at.min(text.len());
        if text.is_char_boundary(at) {
            let _ = scan::read_string_literal(&text, at);
            let _ = scan::balanced_block(&text, at);
            let _ = scan::matching_brace(&text, at);
        }
        let _ = schema::normalize_schema(&text);
        let _ = templates::extract_templates(&text);
    }

    #[test]
    fn truncated_fixtures_still_parse(cut in 0usize..8192) {
        for fixture in [PYTHON_FIXTURE, TYPESCRIPT_FIXTURE] {
            let source = read_fixture(fixture);
            let mut cut = cut.min(source.len());
            while !source.is_char_boundary(cut) {
                cut -= 1;
            }
            let registry = SourceIntrospector::parse(&source[..cut]);
            prop_assert!(registry.tools().len() <= 5);
        }
    }

    #[test]
    fn frame_classification_never_panics(line in "\\PC{0,256}") {
        let _ = frame::classify(&line);
        let _ = frame::salvage_id(&line);
    }

    #[test]
    fn line_assembly_is_chunking_independent(
        lines in prop::collection::vec("[a-z{}\":, ]{0,40}", 1..10),
        split in 1usize..16,
    ) {
        let stream = lines.join("\n") + "\n";

        let mut whole = LineAssembler::new(1024);
        let expected = whole.push(stream.as_bytes());

        let mut chunked = LineAssembler::new(1024);
        let mut actual = Vec::new();
        for chunk in stream.as_bytes().chunks(split) {
            actual.extend(chunked.push(chunk));
        }
        prop_assert_eq!(actual, expected);
        prop_assert_eq!(chunked.pending_bytes(), 0);
    }
}
