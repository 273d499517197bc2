//! Align hex-encoded messages against a vocabulary and print them as a table.
//!
//! Usage:
//!   align_messages VOCAB.vocab --symbol NAME [OPTIONS] [MESSAGES.hex]
//!   align_messages VOCAB.vocab --all [OPTIONS] < messages.hex
//!
//! One message per line, hex encoded (spaces and `:` allowed, `#` starts a comment).
//! Messages are read from stdin when no file is given.
//!
//! Options:
//!   --symbol, -s NAME  Align every message against symbol NAME
//!   --all, -a          Find the symbol of each message (first matching symbol)
//!   --greedy           Only try the longest length of each leaf
//!   --max-paths N      Paths kept per field (default 100, 0 = no pruning)
//!   --partial          Accept messages with trailing bytes
//!   --human, -H        Show decoded text and numbers instead of hex
//!
//! Logging goes to stderr; set RUST_LOG (e.g. RUST_LOG=protovocab=debug) for details.
//! Exits with status 1 when at least one message does not parse.

use anyhow::{bail, Context};
use protovocab::dump::{alignment_table, message_to_dump};
use protovocab::{abstract_message, align_messages, LengthPolicy, Memory, ParserConfig};
use std::io::{self, Read};
use tracing_subscriber::EnvFilter;

fn take_flag(args: &mut Vec<String>, names: &[&str]) -> bool {
    match args.iter().position(|a| names.contains(&a.as_str())) {
        Some(pos) => {
            args.remove(pos);
            true
        }
        None => false,
    }
}

fn take_option(args: &mut Vec<String>, names: &[&str]) -> anyhow::Result<Option<String>> {
    let Some(pos) = args.iter().position(|a| names.contains(&a.as_str())) else {
        return Ok(None);
    };
    if pos + 1 >= args.len() {
        bail!("{} needs a value", args[pos]);
    }
    let value = args.remove(pos + 1);
    args.remove(pos);
    Ok(Some(value))
}

fn parse_hex_line(line: &str) -> anyhow::Result<Option<Vec<u8>>> {
    let line = line.split('#').next().unwrap_or("");
    let digits: String = line.chars().filter(|c| !c.is_whitespace() && *c != ':').collect();
    if digits.is_empty() {
        return Ok(None);
    }
    let digits = digits.strip_prefix("0x").unwrap_or(&digits);
    if !digits.is_ascii() {
        bail!("non hex character in message");
    }
    if digits.len() % 2 != 0 {
        bail!("odd number of hex digits");
    }
    let bytes = (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&digits[i..i + 2], 16))
        .collect::<Result<Vec<u8>, _>>()?;
    Ok(Some(bytes))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let all = take_flag(&mut args, &["--all", "-a"]);
    let human = take_flag(&mut args, &["--human", "-H"]);
    let greedy = take_flag(&mut args, &["--greedy"]);
    let partial = take_flag(&mut args, &["--partial"]);
    let symbol = take_option(&mut args, &["--symbol", "-s"])?;
    let max_paths = take_option(&mut args, &["--max-paths"])?
        .map(|n| n.parse::<usize>().context("--max-paths expects a number"))
        .transpose()?;

    if args.is_empty() || args.len() > 2 {
        bail!("usage: align_messages VOCAB.vocab (--symbol NAME | --all) [OPTIONS] [MESSAGES.hex]");
    }
    let vocab_path = &args[0];
    let source = std::fs::read_to_string(vocab_path).with_context(|| format!("reading {}", vocab_path))?;
    let vocab = protovocab::load(&source).with_context(|| format!("loading {}", vocab_path))?;

    let input = match args.get(1) {
        Some(path) => std::fs::read_to_string(path).with_context(|| format!("reading {}", path))?,
        None => {
            let mut s = String::new();
            io::stdin().read_to_string(&mut s)?;
            s
        }
    };
    let mut messages = Vec::new();
    for (n, line) in input.lines().enumerate() {
        if let Some(bytes) = parse_hex_line(line).with_context(|| format!("line {}", n + 1))? {
            messages.push(bytes);
        }
    }

    let mut config = ParserConfig::default();
    if greedy {
        config.length_policy = LengthPolicy::Greedy;
    }
    if partial {
        config.must_consume_everything = false;
    }
    if let Some(n) = max_paths {
        config.max_parsing_paths = n;
    }

    let mut failed = 0usize;
    match (symbol, all) {
        (Some(symbol), false) => {
            let result = align_messages(&vocab, &symbol, &messages, Memory::new(), &config)?;
            print!("{}", alignment_table(&result, human));
            failed = result.removed.len();
            eprintln!("{}: {} aligned, {} removed", symbol, result.messages.len(), failed);
        }
        (None, true) => {
            let mut memory = Memory::new();
            for (i, data) in messages.iter().enumerate() {
                match abstract_message(&vocab, data, &mut memory, &config) {
                    Ok(parsed) => print!("#{} {}", i, message_to_dump(&parsed)),
                    Err(e) => {
                        failed += 1;
                        println!("#{} unknown: {}", i, e);
                    }
                }
            }
            eprintln!("{} message(s), {} unknown", messages.len(), failed);
        }
        _ => bail!("give exactly one of --symbol NAME or --all"),
    }

    if failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}
