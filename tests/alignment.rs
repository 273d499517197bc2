//! Batch alignment, symbol abstraction and text dumps.

use protovocab::dump::{alignment_table, format_bits, message_to_dump};
use protovocab::{
    abstract_message, align_messages, load, BitBuffer, Memory, ParseError, ParserConfig, ResolvedVocabulary,
};
use test_log::test;

const VOCAB: &str = r#"
symbol Greeting {
	greeting: "hello ";
	name: ascii(5..10) session;
	tail: ", welcome";
}

symbol Sized {
	payload: ascii(6);
	sep: ";";
	len: size(payload) uint8;
}
"#;

fn vocab() -> ResolvedVocabulary {
    load(VOCAB).expect("vocabulary")
}

#[test]
fn align_removes_messages_that_break_the_session() {
    let vocab = vocab();
    let messages: [&[u8]; 5] = [
        b"hello world, welcome",
        b"hello world, welcome",
        b"hello there, welcome",
        b"",
        b"hello world, welcome",
    ];
    let result = align_messages(&vocab, "Greeting", &messages, Memory::new(), &ParserConfig::default())
        .expect("alignment");

    assert_eq!(result.symbol, "Greeting");
    assert_eq!(result.fields, vec!["greeting", "name", "tail"]);
    let indices: Vec<usize> = result.messages.iter().map(|m| m.index).collect();
    assert_eq!(indices, vec![0, 1, 4]);
    let removed: Vec<usize> = result.removed.iter().map(|m| m.index).collect();
    assert_eq!(removed, vec![2, 3]);
    assert_eq!(result.removed[0].data, b"hello there, welcome".to_vec());
    assert_eq!(result.removed[1].reason, ParseError::EmptyInput.to_string());
    assert!(!result.is_complete());

    let names = result.column("name");
    assert_eq!(names.len(), 3);
    assert!(names.iter().all(|b| **b == BitBuffer::from("world")));
    assert_eq!(result.memory.len(), 1);
}

#[test]
fn align_starts_from_given_memory() {
    let vocab = vocab();
    let first = align_messages(&vocab, "Greeting", [b"hello there, welcome"], Memory::new(), &ParserConfig::default())
        .expect("alignment");
    assert!(first.is_complete());

    let second = align_messages(
        &vocab,
        "Greeting",
        [b"hello world, welcome", b"hello there, welcome"],
        first.memory,
        &ParserConfig::default(),
    )
    .expect("alignment");
    assert_eq!(second.messages.len(), 1);
    assert_eq!(second.messages[0].index, 1);
}

#[test]
fn align_unknown_symbol() {
    let vocab = vocab();
    let err = align_messages(&vocab, "Nope", [b"x"], Memory::new(), &ParserConfig::default());
    assert!(matches!(err, Err(ParseError::UnknownSymbol(_))));
}

#[test]
fn abstract_finds_the_first_matching_symbol() {
    let vocab = vocab();
    let config = ParserConfig::default();
    let mut memory = Memory::new();

    let sized = abstract_message(&vocab, b"abcdef;\x06", &mut memory, &config).expect("sized");
    assert_eq!(sized.symbol.as_deref(), Some("Sized"));
    assert!(memory.len() == 1, "payload is learned");

    let greeting = abstract_message(&vocab, b"hello world, welcome", &mut memory, &config).expect("greeting");
    assert_eq!(greeting.symbol.as_deref(), Some("Greeting"));
    assert_eq!(memory.len(), 2);

    let before = memory.clone();
    let unknown = abstract_message(&vocab, b"nothing like it", &mut memory, &config);
    assert!(matches!(unknown, Err(ParseError::NoValidParsing { .. })));
    assert_eq!(memory, before);
}

#[test]
fn dump_message() {
    let vocab = vocab();
    let mut memory = Memory::new();
    let parsed = abstract_message(&vocab, b"hello world, welcome", &mut memory, &ParserConfig::default())
        .expect("greeting");
    let dump = message_to_dump(&parsed);
    let lines: Vec<&str> = dump.lines().collect();
    assert_eq!(lines[0], "Greeting");
    assert_eq!(lines[2], "  name: 77 6f 72 6c 64 (\"world\")");
    assert_eq!(lines.len(), 4);

    assert_eq!(format_bits(&BitBuffer::from(&[0xcau8, 0xfe][..])), "ca fe");
    assert_eq!(format_bits(&BitBuffer::from_bit_str("101")), "b101");
}

#[test]
fn dump_alignment_table() {
    let vocab = vocab();
    let messages = [&b"abcdef;\x06"[..], &b"ghijkl;\x06"[..], &b"abcdef;\x07"[..]];
    let result = align_messages(&vocab, "Sized", messages, Memory::new(), &ParserConfig::default())
        .expect("alignment");

    let table = alignment_table(&result, false);
    let lines: Vec<&str> = table.lines().collect();
    assert_eq!(lines.len(), 5);
    assert!(lines[0].starts_with("# | payload"));
    assert!(lines[1].contains("-+-"));
    assert!(lines[2].starts_with("0 | 61 62 63 64 65 66 | 3b"));
    assert!(lines[3].ends_with("| 06"));
    assert!(lines[4].starts_with("removed #2: 61 62 63 64 65 66 3b 07 ("));

    let human = alignment_table(&result, true);
    assert!(human.lines().nth(3).is_some_and(|l| l.contains("ghijkl")));
}
