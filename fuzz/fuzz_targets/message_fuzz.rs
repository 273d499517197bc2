//! Message fuzz target: parse arbitrary bytes against a fixed vocabulary with
//! alternatives, repetitions and relations. Parsing must not panic.
//! Build with: cargo fuzz run message_fuzz (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
const VOCAB: &str = r#"
symbol Frame {
	kind: alt(0x01, 0x02, uint8);
	len: size(body) uint8;
	body: repeat(agg(ascii(1..4), ";"), 0..10);
	sum: checksum(kind, len, body);
	pad: padding(kind, len, body, sum, 32);
}
"#;

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    let vocab = match protovocab::load(VOCAB) {
        Ok(v) => v,
        Err(_) => return,
    };
    let parser = protovocab::MessageParser::new(&vocab, protovocab::ParserConfig::default());
    if let Ok(parsings) = parser.parse_symbol(data, "Frame") {
        for parsed in parsings.take(4) {
            let _ = parsed.to_bits();
        }
    }
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run message_fuzz");
}
