//! Relations: sizes, checksums, value copies and padding, including relations
//! parsed before the variables they depend on, and vocabulary validation.

use protovocab::checksum::internet_checksum;
use protovocab::{
    BitBuffer, ChecksumAlgorithm, DataType, GrammarError, IntegerType, MessageParser, ParserConfig,
    ResolvedVocabulary, Scope, VocabularyBuilder,
};
use test_log::test;

#[test]
fn crc_check_values() {
    let data = b"123456789";
    assert_eq!(ChecksumAlgorithm::Crc16Arc.calculate(data), 0xBB3D);
    assert_eq!(ChecksumAlgorithm::Crc16CcittFalse.calculate(data), 0x29B1);
    assert_eq!(ChecksumAlgorithm::Crc16Modbus.calculate(data), 0x4B37);
    assert_eq!(ChecksumAlgorithm::Crc16Kermit.calculate(data), 0x2189);
    assert_eq!(ChecksumAlgorithm::Crc16Xmodem.calculate(data), 0x31C3);
    assert_eq!(ChecksumAlgorithm::Crc32.calculate(data), 0xCBF4_3926);
    assert_eq!(ChecksumAlgorithm::Crc32.width_bits(), 32);
    assert_eq!(ChecksumAlgorithm::from_name("crc16_modbus"), Some(ChecksumAlgorithm::Crc16Modbus));
    assert_eq!(ChecksumAlgorithm::from_name("checksum"), Some(ChecksumAlgorithm::Internet));
    assert_eq!(ChecksumAlgorithm::from_name("md5"), None);
}

#[test]
fn internet_checksum_rfc1071_example() {
    assert_eq!(internet_checksum(&[0x00, 0x01, 0xf2, 0x03, 0xf4, 0xf5, 0xf6, 0xf7]), 0x220d);
    // odd length is padded with a zero byte
    assert_eq!(internet_checksum(&[0x01]), internet_checksum(&[0x01, 0x00]));
}

fn sized(size_first: bool) -> ResolvedVocabulary {
    let mut b = VocabularyBuilder::new();
    if size_first {
        let payload = b.data(DataType::ascii_range(1, 20), Scope::Message);
        let len = b.size(&[payload], DataType::uint8());
        let fields = vec![b.field("len", len), b.field("payload", payload)];
        b.symbol("Sized", fields);
    } else {
        let payload = b.data(DataType::ascii(6), Scope::Message);
        let sep = b.text(";");
        let len = b.size(&[payload], DataType::uint8());
        let fields = vec![b.field("payload", payload), b.field("sep", sep), b.field("len", len)];
        b.symbol("Sized", fields);
    }
    b.build().expect("vocabulary")
}

#[test]
fn size_after_payload() {
    let vocab = sized(false);
    let mut parser = MessageParser::new(&vocab, ParserConfig::default());
    let parsed = parser.parse_message(b"abcdef;\x06", "Sized").expect("size matches");
    assert_eq!(parsed.get("len"), Some(&BitBuffer::from(&[6u8][..])));
    assert!(parser.parse_message(b"abcdef;\x07", "Sized").is_err());
}

#[test]
fn size_before_payload_is_checked_once_payload_is_known() {
    let vocab = sized(true);
    let parser = MessageParser::new(&vocab, ParserConfig::default());
    let all: Vec<_> = parser.parse_symbol(b"\x05hello", "Sized").expect("parse").collect();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].get("payload"), Some(&BitBuffer::from("hello")));
    assert!(parser.parse_symbol(b"\x04hello", "Sized").is_err());
}

#[test]
fn size_before_payload_selects_the_payload_length() {
    let mut b = VocabularyBuilder::new();
    let len = b.size(&[], DataType::uint8());
    let payload = b.data(DataType::ascii_range(1, 20), Scope::Message);
    let trailer = b.data(DataType::ascii_range(0, 20), Scope::Message);
    b.set_targets(len, &[payload]).expect("targets");
    let fields = vec![b.field("len", len), b.field("payload", payload), b.field("trailer", trailer)];
    b.symbol("Framed", fields);
    let vocab = b.build().expect("vocabulary");

    let mut parser = MessageParser::new(&vocab, ParserConfig::default());
    let parsed = parser.parse_message(b"\x03abcdefg", "Framed").expect("parse");
    assert_eq!(parsed.get("payload"), Some(&BitBuffer::from("abc")));
    assert_eq!(parsed.get("trailer"), Some(&BitBuffer::from("defg")));
}

#[test]
fn size_with_factor_offset_and_self_length() {
    let mut b = VocabularyBuilder::new();
    let len = b.size_with(&[], DataType::integer(IntegerType::uint16be()), 1.0, -16);
    let body = b.data(DataType::raw_range(0, 16), Scope::None);
    // length in bits of len and body, minus the 16 bits of len
    b.set_targets(len, &[len, body]).expect("targets");
    let fields = vec![b.field("len", len), b.field("body", body)];
    b.symbol("Bits", fields);
    let vocab = b.build().expect("vocabulary");

    let parser = MessageParser::new(&vocab, ParserConfig::default());
    assert!(parser.parse_symbol(&[0x00, 0x18, 1, 2, 3], "Bits").is_ok());
    assert!(parser.parse_symbol(&[0x00, 0x03, 1, 2, 3], "Bits").is_err());
}

fn ip_like() -> (ResolvedVocabulary, protovocab::VariableId, protovocab::VariableId) {
    let mut b = VocabularyBuilder::new();
    let version = b.constant(DataType::uint8(), BitBuffer::from(&[0x45u8][..]));
    let length = b.data(DataType::uint8(), Scope::None);
    let sum = b.internet_checksum(&[]);
    let tail = b.data(DataType::integer(IntegerType::uint16be()), Scope::None);
    let header = b.agg(&[version, length, sum, tail]);
    b.set_targets(sum, &[header]).expect("targets");
    let f = b.field("header", header);
    b.symbol("Header", vec![f]);
    (b.build().expect("vocabulary"), length, tail)
}

#[test]
fn checksum_covering_itself() {
    let (vocab, _, _) = ip_like();
    let parser = MessageParser::new(&vocab, ParserConfig::default());
    // 0x4510 + 0x0000 + 0x1234 = 0x5744, complement 0xa8bb
    assert_eq!(internet_checksum(&[0x45, 0x10, 0x00, 0x00, 0x12, 0x34]), 0xa8bb);
    assert!(parser.parse_symbol(&[0x45, 0x10, 0xa8, 0xbb, 0x12, 0x34], "Header").is_ok());
    assert!(parser.parse_symbol(&[0x45, 0x10, 0xa8, 0xbc, 0x12, 0x34], "Header").is_err());
}

#[test]
fn crc32_trailer_picks_the_right_payload_length() {
    let mut b = VocabularyBuilder::new();
    let payload = b.data(DataType::raw_range(0, 32), Scope::None);
    let crc = b.checksum(&[payload], ChecksumAlgorithm::Crc32);
    let fields = vec![b.field("payload", payload), b.field("crc", crc)];
    b.symbol("Crc", fields);
    let vocab = b.build().expect("vocabulary");

    let mut data = b"123456789".to_vec();
    data.extend_from_slice(&0xCBF4_3926u32.to_be_bytes());
    let parser = MessageParser::new(&vocab, ParserConfig::default());
    let parsed = parser.parse_symbol(&data, "Crc").expect("parse").next().expect("one");
    assert_eq!(parsed.get("payload"), Some(&BitBuffer::from("123456789")));

    let last = data.len() - 1;
    data[last] ^= 0xff;
    assert!(parser.parse_symbol(&data, "Crc").is_err());
}

#[test]
fn checksum_with_little_endian_type() {
    let mut b = VocabularyBuilder::new();
    let payload = b.data(DataType::ascii(9), Scope::None);
    let crc = b.checksum_with(&[payload], ChecksumAlgorithm::Crc16Arc, DataType::integer(IntegerType::uint16le()));
    let fields = vec![b.field("payload", payload), b.field("crc", crc)];
    b.symbol("Crc16", fields);
    let vocab = b.build().expect("vocabulary");

    let parser = MessageParser::new(&vocab, ParserConfig::default());
    assert!(parser.parse_symbol(b"123456789\x3d\xbb", "Crc16").is_ok());
    assert!(parser.parse_symbol(b"123456789\xbb\x3d", "Crc16").is_err());
}

#[test]
fn value_of_before_and_after_target() {
    let mut b = VocabularyBuilder::new();
    let a = b.data(DataType::ascii(3), Scope::Message);
    let sep = b.text(":");
    let copy = b.value_of(a);
    let fields = vec![b.field("a", a), b.field("sep", sep), b.field("copy", copy)];
    b.symbol("After", fields);

    let a2 = b.data(DataType::ascii(3), Scope::Message);
    let sep2 = b.text(":");
    let copy2 = b.value_of(a2);
    let fields = vec![b.field("copy", copy2), b.field("sep", sep2), b.field("a", a2)];
    b.symbol("Before", fields);
    let vocab = b.build().expect("vocabulary");

    let parser = MessageParser::new(&vocab, ParserConfig::default());
    assert!(parser.parse_symbol(b"abc:abc", "After").is_ok());
    assert!(parser.parse_symbol(b"abc:abd", "After").is_err());
    assert!(parser.parse_symbol(b"xyz:xyz", "Before").is_ok());
    assert!(parser.parse_symbol(b"xyz:xya", "Before").is_err());
}

#[test]
fn padding_aligns_to_modulo() {
    let mut b = VocabularyBuilder::new();
    let text = b.data(DataType::ascii_range(1, 7), Scope::None);
    let pad = b.padding(&[text], 32, 0x00);
    let fields = vec![b.field("text", text), b.field("pad", pad)];
    b.symbol("Padded", fields);
    let vocab = b.build().expect("vocabulary");

    let parser = MessageParser::new(&vocab, ParserConfig::default());
    let all: Vec<_> = parser.parse_symbol(b"abc\0", "Padded").expect("parse").collect();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].get("text"), Some(&BitBuffer::from("abc")));
    assert_eq!(all[0].get("pad"), Some(&BitBuffer::from(&[0u8][..])));

    let exact = parser.parse_symbol(b"abcd", "Padded").expect("no padding needed").next().expect("one");
    assert!(exact.get("pad").map(BitBuffer::is_empty).unwrap_or(false));
    assert!(parser.parse_symbol(b"abc\x01", "Padded").is_err());
}

#[test]
fn cyclic_relations_are_rejected() {
    let mut b = VocabularyBuilder::new();
    let first = b.size(&[], DataType::uint8());
    let second = b.size(&[first], DataType::uint8());
    b.set_targets(first, &[second]).expect("targets");
    let fields = vec![b.field("first", first), b.field("second", second)];
    b.symbol("Cycle", fields);
    assert!(matches!(b.build(), Err(GrammarError::CyclicRelation(_))));
}

#[test]
fn relation_order_puts_dependencies_first() {
    let (vocab, _, _) = ip_like();
    assert_eq!(vocab.relation_order().len(), 1);

    let mut b = VocabularyBuilder::new();
    let payload = b.data(DataType::raw_range(0, 8), Scope::None);
    let len = b.size(&[payload], DataType::uint8());
    let body = b.agg(&[len, payload]);
    let crc = b.checksum(&[body], ChecksumAlgorithm::Crc16Arc);
    let fields = vec![b.field("body", body), b.field("crc", crc)];
    b.symbol("Nested", fields);
    let vocab = b.build().expect("vocabulary");
    assert_eq!(vocab.relation_order(), &[len, crc]);
}

#[test]
fn invalid_vocabularies_are_rejected() {
    let mut b = VocabularyBuilder::new();
    let head = b.data(DataType::ascii_unbounded(1), Scope::None);
    let tail = b.text("x");
    let fields = vec![b.field("head", head), b.field("tail", tail)];
    b.symbol("Unbounded", fields);
    assert!(matches!(b.build(), Err(GrammarError::UnboundedLeaf { field, .. }) if field == "head"));

    let mut b = VocabularyBuilder::new();
    let c = b.data(DataType::uint8(), Scope::Constant);
    let f = b.field("c", c);
    b.symbol("NoValue", vec![f]);
    assert!(matches!(b.build(), Err(GrammarError::MissingConstantValue(_))));

    let mut b = VocabularyBuilder::new();
    let item = b.data(DataType::uint8(), Scope::None);
    let items = b.repeat(item, 3, 2);
    let f = b.field("items", items);
    b.symbol("BadRepeat", vec![f]);
    assert!(matches!(b.build(), Err(GrammarError::InvalidRepeat(_))));

    let mut b = VocabularyBuilder::new();
    let payload = b.data(DataType::raw(2), Scope::None);
    let crc = b.checksum_with(&[payload], ChecksumAlgorithm::Crc32, DataType::integer(IntegerType::uint16be()));
    let fields = vec![b.field("payload", payload), b.field("crc", crc)];
    b.symbol("Narrow", fields);
    assert!(matches!(b.build(), Err(GrammarError::RelationWidth(_))));

    let mut b = VocabularyBuilder::new();
    let orphan = b.data(DataType::uint8(), Scope::None);
    let len = b.size(&[orphan], DataType::uint8());
    let f = b.field("len", len);
    b.symbol("Orphan", vec![f]);
    assert!(matches!(b.build(), Err(GrammarError::UnreachableTarget(_))));

    let mut b = VocabularyBuilder::new();
    let v = b.data(DataType::uint8(), Scope::None);
    let f1 = b.field("a", v);
    let f2 = b.field("b", v);
    b.symbol("Shared", vec![f1, f2]);
    assert!(matches!(b.build(), Err(GrammarError::DomainReused(_))));

    let mut b = VocabularyBuilder::new();
    b.symbol("Empty", vec![]);
    assert!(matches!(b.build(), Err(GrammarError::EmptySymbol(_))));
}
