use super::{IngestDecoder, IngestError, IngestMode};
use serde_json::json;

#[test]
fn test_stream_values_wait_for_line_end() {
    let mut decoder = IngestDecoder::new();

    let first = decoder.feed_str("{\"a\":1}\n{\"a\":").unwrap();
    assert_eq!(first, vec![json!({"a": 1})]);
    assert_eq!(decoder.mode(), IngestMode::Stream);

    let second = decoder.feed_str("2}\n").unwrap();
    assert_eq!(second, vec![json!({"a": 2})]);

    assert!(decoder.finish().unwrap().is_empty());
}

#[test]
fn test_batch_values_only_after_finish() {
    let mut decoder = IngestDecoder::new();
    assert!(decoder.feed_str("[").unwrap().is_empty());
    assert!(decoder.feed_str("1,2").unwrap().is_empty());
    assert!(decoder.feed_str("]").unwrap().is_empty());
    assert_eq!(decoder.mode(), IngestMode::Batch);

    assert_eq!(decoder.finish().unwrap(), vec![json!(1), json!(2)]);
}

#[test]
fn test_all_line_terminators() {
    let mut decoder = IngestDecoder::new();
    let values = decoder
        .feed_str("{\"n\":1}\r\n{\"n\":2}\r{\"n\":3}\n")
        .unwrap();
    assert_eq!(values, vec![json!({"n": 1}), json!({"n": 2}), json!({"n": 3})]);
}

#[test]
fn test_crlf_split_across_chunks() {
    let mut decoder = IngestDecoder::new();
    assert_eq!(decoder.feed_str("{\"n\":1}\r").unwrap(), vec![json!({"n": 1})]);
    assert!(decoder.feed_str("\n").unwrap().is_empty());
    assert_eq!(decoder.feed_str("{\"n\":2}\n").unwrap(), vec![json!({"n": 2})]);
}

#[test]
fn test_trailing_line_without_terminator() {
    let mut decoder = IngestDecoder::new();
    assert!(decoder.feed_str("{\"last\":true}").unwrap().is_empty());
    assert_eq!(decoder.finish().unwrap(), vec![json!({"last": true})]);
}

#[test]
fn test_blank_lines_and_leading_whitespace_are_skipped() {
    let mut decoder = IngestDecoder::new();
    assert!(decoder.feed_str("  \n\n").unwrap().is_empty());
    assert_eq!(decoder.mode(), IngestMode::Undecided);

    let values = decoder.feed_str("\t{\"x\":1}\n\n   \n{\"x\":2}\n").unwrap();
    assert_eq!(values, vec![json!({"x": 1}), json!({"x": 2})]);
}

#[test]
fn test_multibyte_utf8_split_across_chunks() {
    let text = "{\"word\":\"naïve\"}\n".as_bytes();
    let split = text.iter().position(|&b| b == 0xC3).unwrap() + 1;

    let mut decoder = IngestDecoder::new();
    assert!(decoder.feed(&text[..split]).unwrap().is_empty());
    assert_eq!(
        decoder.feed(&text[split..]).unwrap(),
        vec![json!({"word": "naïve"})]
    );
}

#[test]
fn test_nested_arrays_are_flattened_in_order() {
    let mut decoder = IngestDecoder::new();
    decoder.feed_str("[1, [2, [3, 4]], {\"k\": [5]}, 6]").unwrap();
    assert_eq!(
        decoder.finish().unwrap(),
        vec![json!(1), json!(2), json!(3), json!(4), json!({"k": [5]}), json!(6)]
    );
}

#[test]
fn test_unexpected_leading_character() {
    let mut decoder = IngestDecoder::new();
    let err = decoder.feed_str("  hello").unwrap_err();
    assert!(matches!(err, IngestError::UnexpectedLead('h')));
}

#[test]
fn test_invalid_line_reports_line_number() {
    let mut decoder = IngestDecoder::new();
    let err = decoder.feed_str("{\"ok\":1}\n{broken\n").unwrap_err();
    match err {
        IngestError::Line { line, .. } => assert_eq!(line, 2),
        other => panic!("Expected a line error, got {other:?}"),
    }
}

#[test]
fn test_invalid_batch_document() {
    let mut decoder = IngestDecoder::new();
    decoder.feed_str("[1, 2").unwrap();
    assert!(matches!(decoder.finish(), Err(IngestError::Batch(_))));
}

#[test]
fn test_empty_input_yields_nothing() {
    let mut decoder = IngestDecoder::new();
    assert!(decoder.feed_str("").unwrap().is_empty());
    assert!(decoder.finish().unwrap().is_empty());
}
