//! Format parsed messages and alignments for display.

use crate::align::AlignmentResult;
use crate::bits::BitBuffer;
use crate::message_parser::{ParsedField, ParsedMessage};
use crate::value::Value;

fn hex_string(b: &[u8]) -> String {
    b.iter().map(|x| format!("{:02x}", x)).collect::<Vec<_>>().join(" ")
}

/// Hex bytes separated by spaces, or `b0101...` when not byte aligned.
pub fn format_bits(bits: &BitBuffer) -> String {
    match bits.to_bytes() {
        Ok(bytes) => hex_string(&bytes),
        Err(_) => format!("b{}", bits.to_bit_string()),
    }
}

/// Cell content for one field: decoded text/number when `human`, hex otherwise.
pub fn format_field(field: &ParsedField, human: bool) -> String {
    if !human {
        return format_bits(&field.bits);
    }
    match &field.value {
        Some(Value::Text(s)) => s.escape_default().to_string(),
        Some(Value::Bytes(_)) | Some(Value::Bits(_)) | None => format_bits(&field.bits),
        Some(v) => v.to_string(),
    }
}

/// One `name: hex (value)` line per field.
pub fn message_to_dump(msg: &ParsedMessage) -> String {
    let mut out = String::new();
    if let Some(symbol) = &msg.symbol {
        out.push_str(symbol);
        out.push('\n');
    }
    for f in msg.fields() {
        out.push_str("  ");
        out.push_str(&f.name);
        out.push_str(": ");
        out.push_str(&format_bits(&f.bits));
        match &f.value {
            Some(Value::Bytes(_)) | Some(Value::Bits(_)) | None => {}
            Some(v) => {
                out.push_str(" (");
                out.push_str(&v.to_string());
                out.push(')');
            }
        }
        out.push('\n');
    }
    if !msg.remaining().is_empty() {
        out.push_str(&format!("  <remaining>: {}\n", format_bits(msg.remaining())));
    }
    out
}

/// Table with one column per field and one row per accepted message, followed by
/// the removed messages.
pub fn alignment_table(result: &AlignmentResult, human: bool) -> String {
    let mut header = vec!["#".to_string()];
    header.extend(result.fields.iter().cloned());
    let mut rows: Vec<Vec<String>> = vec![header];
    for m in &result.messages {
        let mut row = vec![m.index.to_string()];
        row.extend(m.parsed.fields().iter().map(|f| format_field(f, human)));
        rows.push(row);
    }

    let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
    let widths: Vec<usize> = (0..columns)
        .map(|c| rows.iter().filter_map(|r| r.get(c)).map(|s| s.chars().count()).max().unwrap_or(0))
        .collect();

    let mut out = String::new();
    for (i, row) in rows.iter().enumerate() {
        let cells: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(c, s)| format!("{:width$}", s, width = widths[c]))
            .collect();
        out.push_str(cells.join(" | ").trim_end());
        out.push('\n');
        if i == 0 {
            let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
            out.push_str(&rule.join("-+-"));
            out.push('\n');
        }
    }
    for r in &result.removed {
        out.push_str(&format!("removed #{}: {} ({})\n", r.index, hex_string(&r.data), r.reason));
    }
    out
}
