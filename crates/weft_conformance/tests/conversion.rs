//! Conversion engine conformance.

use weft_cache::{BufferCache, NoRemote};
use weft_common::{Buffer, CellType, Checksum};
use weft_convert::{check_conversions, classify, expand_conversion, ConversionError, Converter};

fn cache() -> BufferCache {
    BufferCache::new(Box::new(NoRemote))
}

fn store(cache: &mut BufferCache, text: &str) -> Checksum {
    let buffer = Buffer::from_text(text);
    let checksum = buffer.checksum();
    cache.cache_buffer(checksum, buffer).unwrap();
    checksum
}

#[test]
fn classification_table_is_total_and_consistent() {
    check_conversions().unwrap();
}

#[test]
fn trivial_conversions_preserve_the_checksum() {
    let mut cache = cache();
    let mut conv = Converter::new();
    let cs = store(&mut cache, "payload");
    for (from, to) in [
        (CellType::Code, CellType::Text),
        (CellType::Text, CellType::Bytes),
        (CellType::Plain, CellType::Bytes),
        (CellType::Plain, CellType::Mixed),
        (CellType::Str, CellType::Plain),
        (CellType::Int, CellType::Plain),
    ] {
        let fetched_before = conv.counters().buffer_fetches;
        let out = conv.convert(&mut cache, cs, from, to).unwrap();
        assert_eq!(out, cs, "{from} -> {to} must not rewrite the buffer");
        assert_eq!(
            conv.counters().buffer_fetches,
            fetched_before,
            "{from} -> {to} must not fetch"
        );
    }
}

#[test]
fn reinterpretation_validates_but_preserves_the_checksum() {
    let mut cache = cache();
    let mut conv = Converter::new();
    let cs = store(&mut cache, "[1, 2, 3]");
    let out = conv
        .convert(&mut cache, cs, CellType::Bytes, CellType::Plain)
        .unwrap();
    assert_eq!(out, cs);

    let bad = store(&mut cache, "not json {");
    let err = conv
        .convert(&mut cache, bad, CellType::Bytes, CellType::Plain)
        .unwrap_err();
    assert!(matches!(err, ConversionError::Content { .. }));
}

#[test]
fn chain_decomposition_matches_direct_invocation() {
    // text -> bool expands through plain; running the expansion step by
    // step must land on the same result as one engine call
    let steps = expand_conversion(CellType::Text, CellType::Bool).unwrap();
    assert!(steps.len() > 1);

    let mut cache1 = cache();
    let mut direct = Converter::new();
    let cs = store(&mut cache1, "true");
    let expected = direct
        .convert(&mut cache1, cs, CellType::Text, CellType::Bool)
        .unwrap();

    let mut cache2 = cache();
    let mut stepwise = Converter::new();
    let mut cur = store(&mut cache2, "true");
    let mut cur_type = CellType::Text;
    for (hop_from, hop_to) in steps {
        assert_eq!(hop_from, cur_type);
        cur = stepwise
            .convert(&mut cache2, cur, hop_from, hop_to)
            .unwrap();
        cur_type = hop_to;
    }
    assert_eq!(cur_type, CellType::Bool);
    assert_eq!(cur, expected);
}

#[test]
fn python_code_never_converts_to_a_boolean() {
    assert!(matches!(
        classify(CellType::Code, CellType::Bool),
        weft_convert::ConversionKind::Forbidden
    ));
    let mut cache = cache();
    let mut conv = Converter::new();
    let cs = store(&mut cache, "flag = True");
    let err = conv
        .convert(&mut cache, cs, CellType::Code, CellType::Bool)
        .unwrap_err();
    match err {
        ConversionError::Forbidden { from, to } => {
            assert_eq!(from, CellType::Code);
            assert_eq!(to, CellType::Bool);
        }
        other => panic!("expected a forbidden conversion, got {other}"),
    }
}

#[test]
fn reformat_to_binary_with_caching() {
    let mut cache = cache();
    let mut conv = Converter::new();

    // an object has no array form
    let object = store(&mut cache, "{\"a\": 1}");
    let err = conv
        .convert(&mut cache, object, CellType::Plain, CellType::Binary)
        .unwrap_err();
    assert!(matches!(err, ConversionError::Content { .. }));

    // a homogeneous list converts, and the repeat costs nothing
    let list = store(&mut cache, "[1, 2, 3]");
    let first = conv
        .convert(&mut cache, list, CellType::Plain, CellType::Binary)
        .unwrap();
    let executed = conv.counters().conversions_executed;
    let second = conv
        .convert(&mut cache, list, CellType::Plain, CellType::Binary)
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(
        conv.counters().conversions_executed,
        executed,
        "repeat conversion must be served from the memo"
    );
    assert!(conv.counters().memo_hits >= 1);

    // the reverse direction is memoized on the result buffer
    let back = conv
        .convert(&mut cache, first, CellType::Binary, CellType::Plain)
        .unwrap();
    assert_eq!(back, list);
    assert_eq!(conv.counters().conversions_executed, executed);
}
