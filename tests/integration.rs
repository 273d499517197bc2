//! Integration tests: message parsing with backtracking, alternatives, repetitions,
//! pruning, total consumption and length policies.

use protovocab::{
    prune_paths, BitBuffer, DataType, LengthPolicy, MessageParser, ParseError, ParserConfig, ResolvedVocabulary,
    Scope, VocabularyBuilder, MAX_PARSING_PATHS,
};
use test_log::test;

fn greeting(scope: Scope) -> ResolvedVocabulary {
    let mut b = VocabularyBuilder::new();
    let hello = b.text("hello ");
    let name = b.data(DataType::ascii_range(5, 10), scope);
    let tail = b.text(", welcome");
    let fields = vec![b.field("greeting", hello), b.field("name", name), b.field("tail", tail)];
    b.symbol("Greeting", fields);
    b.build().expect("greeting vocabulary")
}

#[test]
fn parse_hello_world_backtracks_to_short_name() {
    let vocab = greeting(Scope::Message);
    let mut parser = MessageParser::new(&vocab, ParserConfig::default());
    let parsed = parser.parse_message(b"hello world, welcome", "Greeting").expect("parse");
    assert_eq!(parsed.symbol.as_deref(), Some("Greeting"));
    assert_eq!(parsed.values().len(), 3);
    assert_eq!(parsed.get("greeting"), Some(&BitBuffer::from("hello ")));
    assert_eq!(parsed.get("name"), Some(&BitBuffer::from("world")));
    assert_eq!(parsed.get("tail"), Some(&BitBuffer::from(", welcome")));
    assert_eq!(parsed.value("name").and_then(|v| v.as_str()), Some("world"));
    assert!(parsed.remaining().is_empty());
}

#[test]
fn parse_hello_world_has_a_single_parsing() {
    let vocab = greeting(Scope::Message);
    let parser = MessageParser::new(&vocab, ParserConfig::default());
    let all: Vec<_> = parser.parse_symbol(b"hello world, welcome", "Greeting").expect("parse").collect();
    assert_eq!(all.len(), 1);
}

#[test]
fn parse_rejects_wrong_constant() {
    let vocab = greeting(Scope::Message);
    let parser = MessageParser::new(&vocab, ParserConfig::default());
    let err = parser.parse_symbol(b"hello world, welkome", "Greeting").err().expect("must fail");
    match err {
        ParseError::NoValidParsing { data } => assert_eq!(data, b"hello world, welkome".to_vec()),
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn parse_empty_input_and_unknown_symbol() {
    let vocab = greeting(Scope::Message);
    let parser = MessageParser::new(&vocab, ParserConfig::default());
    assert!(matches!(parser.parse_symbol(b"", "Greeting"), Err(ParseError::EmptyInput)));
    assert!(matches!(parser.parse_symbol(b"hello", "Nope"), Err(ParseError::UnknownSymbol(s)) if s == "Nope"));
    assert!(matches!(parser.parse_raw(b"hello", &[]), Err(ParseError::NoFields)));
}

#[test]
fn parse_every_result_consumes_the_whole_message() {
    let mut b = VocabularyBuilder::new();
    let a = b.data(DataType::ascii_range(1, 10), Scope::None);
    let sep = b.text(" ");
    let c = b.data(DataType::ascii_range(1, 10), Scope::None);
    let fields = vec![b.field("a", a), b.field("sep", sep), b.field("c", c)];
    b.symbol("Words", fields);
    let vocab = b.build().expect("vocabulary");

    let data = b"ab cd ef";
    let parser = MessageParser::new(&vocab, ParserConfig::default());
    let all: Vec<_> = parser.parse_symbol(data, "Words").expect("parse").collect();
    // "ab cd" + " " + "ef" and "ab" + " " + "cd ef"
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].get("a"), Some(&BitBuffer::from("ab cd")));
    assert_eq!(all[1].get("a"), Some(&BitBuffer::from("ab")));
    for parsed in &all {
        let total: usize = parsed.values().iter().map(|b| b.len()).sum();
        assert_eq!(total, data.len() * 8);
        assert_eq!(parsed.to_bits(), BitBuffer::from(&data[..]));
    }
}

#[test]
fn parse_partial_keeps_remaining_bits() {
    let mut b = VocabularyBuilder::new();
    let magic = b.bytes(&[0xca, 0xfe]);
    let f = b.field("magic", magic);
    b.symbol("Magic", vec![f]);
    let vocab = b.build().expect("vocabulary");

    let strict = MessageParser::new(&vocab, ParserConfig::default());
    assert!(strict.parse_symbol(&[0xca, 0xfe, 0x01], "Magic").is_err());

    let config = ParserConfig { must_consume_everything: false, ..ParserConfig::default() };
    let partial = MessageParser::new(&vocab, config);
    let parsed = partial.parse_symbol(&[0xca, 0xfe, 0x01], "Magic").expect("parse").next().expect("one");
    assert_eq!(parsed.remaining(), &BitBuffer::from(&[0x01u8][..]));
}

#[test]
fn alternation_tries_every_child() {
    let mut b = VocabularyBuilder::new();
    let long = b.text("ab");
    let short = b.text("a");
    let choice = b.alt(&[long, short]);
    let tail = b.text("bc");
    let fields = vec![b.field("choice", choice), b.field("tail", tail)];
    b.symbol("Choice", fields);
    let vocab = b.build().expect("vocabulary");

    let mut parser = MessageParser::new(&vocab, ParserConfig::default());
    let parsed = parser.parse_message(b"abc", "Choice").expect("second child must be tried");
    assert_eq!(parsed.get("choice"), Some(&BitBuffer::from("a")));
    assert_eq!(parsed.get("tail"), Some(&BitBuffer::from("bc")));
}

#[test]
fn aggregate_fields_concatenate_children() {
    let mut b = VocabularyBuilder::new();
    let kind = b.data(DataType::uint8(), Scope::None);
    let port = b.data(DataType::integer(protovocab::IntegerType::uint16be()), Scope::None);
    let header = b.agg(&[kind, port]);
    let body = b.data(DataType::raw_range(0, 8), Scope::None);
    let fields = vec![b.field("header", header), b.field("body", body)];
    b.symbol("Packet", fields);
    let vocab = b.build().expect("vocabulary");

    let mut parser = MessageParser::new(&vocab, ParserConfig::default());
    let parsed = parser.parse_message(&[0x01, 0x00, 0x50, 0xaa, 0xbb], "Packet").expect("parse");
    assert_eq!(parsed.get("header"), Some(&BitBuffer::from(&[0x01u8, 0x00, 0x50][..])));
    assert_eq!(parsed.get("body"), Some(&BitBuffer::from(&[0xaau8, 0xbb][..])));
    // a node field has no single decoded value
    assert!(parsed.value("header").is_none());
    assert!(parsed.value("body").is_some());
}

#[test]
fn repeat_prefers_more_iterations() {
    let mut b = VocabularyBuilder::new();
    let item = b.data(DataType::uint8(), Scope::None);
    let items = b.repeat(item, 1, 5);
    let end = b.text("!");
    let fields = vec![b.field("items", items), b.field("end", end)];
    b.symbol("List", fields);
    let vocab = b.build().expect("vocabulary");

    let parser = MessageParser::new(&vocab, ParserConfig::default());
    let all: Vec<_> = parser.parse_symbol(&[1, 2, 3, b'!'], "List").expect("parse").collect();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].get("items"), Some(&BitBuffer::from(&[1u8, 2, 3][..])));
}

#[test]
fn repeat_with_delimiter() {
    let mut b = VocabularyBuilder::new();
    let item = b.data(DataType::ascii(2), Scope::None);
    let items = b.repeat_delimited(item, 1, 10, BitBuffer::from(","));
    let f = b.field("items", items);
    b.symbol("Csv", vec![f]);
    let vocab = b.build().expect("vocabulary");

    let parser = MessageParser::new(&vocab, ParserConfig::default());
    let all: Vec<_> = parser.parse_symbol(b"ab,cd,ef", "Csv").expect("parse").collect();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].get("items"), Some(&BitBuffer::from("ab,cd,ef")));
    assert!(parser.parse_symbol(b"ab,cd,e", "Csv").is_err());
    assert!(parser.parse_symbol(b"ab,cd,", "Csv").is_err());
}

#[test]
fn repeat_ignores_empty_iterations() {
    let mut b = VocabularyBuilder::new();
    let piece = b.data(DataType::ascii_range(0, 2), Scope::None);
    let pieces = b.repeat(piece, 0, 1000);
    let f = b.field("pieces", pieces);
    b.symbol("Pieces", vec![f]);
    let vocab = b.build().expect("vocabulary");

    let parser = MessageParser::new(&vocab, ParserConfig::default());
    // compositions of 4 characters in parts of 1 or 2
    let count = parser.parse_symbol(b"abcd", "Pieces").expect("parse").count();
    assert_eq!(count, 5);
}

fn two_free_fields() -> ResolvedVocabulary {
    let mut b = VocabularyBuilder::new();
    let first = b.data(DataType::ascii_range(0, 200), Scope::None);
    let second = b.data(DataType::ascii_range(0, 200), Scope::None);
    let fields = vec![b.field("first", first), b.field("second", second)];
    b.symbol("Free", fields);
    b.build().expect("vocabulary")
}

#[test]
fn prune_paths_keeps_head_and_tail() {
    let kept = prune_paths((0..250).collect::<Vec<u32>>(), 100);
    assert_eq!(kept.len(), 100);
    assert_eq!(&kept[..50], &(0..50).collect::<Vec<_>>()[..]);
    assert_eq!(&kept[50..], &(200..250).collect::<Vec<_>>()[..]);

    let odd = prune_paths((0..10).collect::<Vec<u32>>(), 5);
    assert_eq!(odd, vec![0, 1, 7, 8, 9]);
    assert_eq!(prune_paths(vec![1, 2, 3], 100), vec![1, 2, 3]);
    assert_eq!(prune_paths((0..500).collect::<Vec<u32>>(), 0).len(), 500);
}

#[test]
fn pruning_caps_paths_per_field() {
    let vocab = two_free_fields();
    let data = vec![b'a'; 150];
    let parser = MessageParser::new(&vocab, ParserConfig::default());
    let lengths: Vec<usize> = parser
        .parse_symbol(&data, "Free")
        .expect("parse")
        .map(|p| p.get("first").map(BitBuffer::len).unwrap_or(0) / 8)
        .collect();
    assert_eq!(lengths.len(), MAX_PARSING_PATHS);
    assert_eq!(lengths[0], 150);
    assert_eq!(lengths[49], 101);
    assert_eq!(lengths[50], 49);
    assert_eq!(lengths[99], 0);

    let again: Vec<usize> = parser
        .parse_symbol(&data, "Free")
        .expect("parse")
        .map(|p| p.get("first").map(BitBuffer::len).unwrap_or(0) / 8)
        .collect();
    assert_eq!(lengths, again);
}

#[test]
fn pruning_disabled_with_zero_cap() {
    let vocab = two_free_fields();
    let config = ParserConfig { max_parsing_paths: 0, ..ParserConfig::default() };
    let parser = MessageParser::new(&vocab, config);
    assert_eq!(parser.parse_symbol(&[b'a'; 150], "Free").expect("parse").count(), 151);
}

#[test]
fn greedy_policy_takes_longest_length_only() {
    let vocab = greeting(Scope::Message);
    let config = ParserConfig { length_policy: LengthPolicy::Greedy, ..ParserConfig::default() };
    let parser = MessageParser::new(&vocab, config.clone());
    // the longest name swallows ", wel" and the tail can no longer match
    assert!(parser.parse_symbol(b"hello world, welcome", "Greeting").is_err());
    // with a name of ten characters the greedy choice is the right one
    let parsed = parser
        .parse_symbol(b"hello abcdefghij, welcome", "Greeting")
        .expect("parse")
        .next()
        .expect("one");
    assert_eq!(parsed.get("name"), Some(&BitBuffer::from("abcdefghij")));

    let free = two_free_fields();
    let greedy = MessageParser::new(&free, config);
    assert_eq!(greedy.parse_symbol(&[b'a'; 150], "Free").expect("parse").count(), 1);
}

#[test]
fn parse_bits_on_non_byte_aligned_fields() {
    let mut b = VocabularyBuilder::new();
    let flags = b.data(DataType::bits(3), Scope::None);
    let rest = b.data(DataType::bits(5), Scope::None);
    let fields = vec![b.field("flags", flags), b.field("rest", rest)];
    b.symbol("Flags", fields);
    let vocab = b.build().expect("vocabulary");

    let parser = MessageParser::new(&vocab, ParserConfig::default());
    let parsed = parser.parse_symbol(&[0b1010_0001], "Flags").expect("parse").next().expect("one");
    assert_eq!(parsed.get("flags"), Some(&BitBuffer::from_bit_str("101")));
    assert_eq!(parsed.get("rest"), Some(&BitBuffer::from_bit_str("00001")));
}
