//! Tokenise: convert plain BBC BASIC source text into the ROM's
//! line-record format.
//!
//! The reference tokeniser matches keywords through a 9-character
//! lookahead ring buffer that it re-scans one character at a time.
//! Here the same `AbbreviationTable`-driven longest-match search is
//! reimplemented directly against the remaining line slice, which
//! gives identical results without the ring-buffer bookkeeping.

use super::export::Error;
use super::keywords::{find_by_token, KeywordFlags, ABBREVIATIONS};
use super::linenum;

/// Tokenises `source`, returning the complete byte stream including
/// the final `0x0D 0xFF` program terminator. `\r` is stripped before
/// processing; blank (whitespace-only) lines are skipped.
pub fn tokenise(source: &str) -> Result<Vec<u8>, Error> {
    let mut out = Vec::new();
    let mut last_line_number: u32 = 0;

    let cleaned: String = source.chars().filter(|&c| c != '\r').collect();
    for raw_line in cleaned.split('\n') {
        let bytes = raw_line.as_bytes();
        let mut i = 0;
        while i < bytes.len() && (bytes[i] == b' ' || bytes[i] == b'\t') {
            i += 1;
        }
        if i >= bytes.len() {
            continue;
        }

        let num_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        let line_number = if i > num_start {
            let text = std::str::from_utf8(&bytes[num_start..i]).unwrap();
            let value: u64 = text
                .parse()
                .map_err(|_| Error::MalformedLineNumber(last_line_number))?;
            if value >= 32768 || value as u32 <= last_line_number {
                return Err(Error::OutOfSequenceLineNumber {
                    previous: last_line_number,
                    found: value as u32,
                });
            }
            value as u32
        } else {
            let auto = last_line_number + 1;
            if auto >= 32768 {
                return Err(Error::MalformedLineNumber(last_line_number));
            }
            auto
        };
        last_line_number = line_number;

        out.push(0x0D);
        out.push((line_number >> 8) as u8);
        out.push((line_number & 0xFF) as u8);
        let length_pos = out.len();
        out.push(0);

        encode_statement(&bytes[i..], line_number, &mut out)?;

        let total = out.len() - length_pos + 3;
        if total > 255 {
            return Err(Error::LineTooLong(line_number));
        }
        out[length_pos] = total as u8;
    }

    out.push(0x0D);
    out.push(0xFF);
    Ok(out)
}

/// Tokenises one line's statement text (after the line number),
/// appending bytes directly to `out`.
fn encode_statement(line: &[u8], line_number: u32, out: &mut Vec<u8>) -> Result<(), Error> {
    let mut start_of_statement = true;
    let mut i = 0;

    while i < line.len() {
        if let Some((token, len, flags)) = match_keyword(&line[i..]) {
            let suppressed = flags.conditional
                && line
                    .get(i + len)
                    .is_some_and(|b| b.is_ascii_alphanumeric());
            if !suppressed {
                out.push(token);
                let token_pos = out.len() - 1;
                i += len;

                if flags.proc_fn {
                    while i < line.len() && line[i].is_ascii_alphanumeric() {
                        out.push(line[i]);
                        i += 1;
                    }
                }
                if flags.line_number_follows {
                    i = encode_line_number_operand(line, i, out)?;
                }
                if flags.verbatim_rest_of_line {
                    out.extend_from_slice(&line[i..]);
                    return Ok(());
                }
                if flags.pseudo_variable && start_of_statement {
                    out[token_pos] += 0x40;
                }
                if flags.ends_statement {
                    start_of_statement = false;
                }
                if flags.starts_statement {
                    start_of_statement = true;
                }
                continue;
            }
        }

        let byte = line[i];
        match byte {
            b'"' => {
                out.push(b'"');
                i += 1;
                while i < line.len() && line[i] != b'"' {
                    out.push(line[i]);
                    i += 1;
                }
                if i >= line.len() {
                    return Err(Error::MalformedStringLiteral(line_number));
                }
                out.push(b'"');
                i += 1;
            }
            b'*' if start_of_statement => {
                // a `*` command at the start of a statement runs to the
                // end of the line uninterpreted, string literals aside.
                out.push(b'*');
                i += 1;
                while i < line.len() {
                    if line[i] == b'"' {
                        out.push(b'"');
                        i += 1;
                        while i < line.len() && line[i] != b'"' {
                            out.push(line[i]);
                            i += 1;
                        }
                        if i < line.len() {
                            out.push(b'"');
                            i += 1;
                        }
                    } else {
                        out.push(line[i]);
                        i += 1;
                    }
                }
            }
            b':' => {
                out.push(byte);
                i += 1;
                start_of_statement = true;
            }
            _ => {
                out.push(byte);
                i += 1;
                if byte.is_ascii_alphabetic() {
                    start_of_statement = false;
                    while i < line.len() && line[i].is_ascii_alphanumeric() {
                        out.push(line[i]);
                        i += 1;
                    }
                }
            }
        }
    }
    Ok(())
}

/// Encodes the operand of a keyword flagged `line_number_follows`:
/// decimal line numbers become a `0x8D` + 3-byte record, everything
/// else (spaces, commas, hex literals, string literals) passes through
/// literally until a byte that can't belong to the operand is found.
fn encode_line_number_operand(
    line: &[u8],
    mut i: usize,
    out: &mut Vec<u8>,
) -> Result<usize, Error> {
    loop {
        if i >= line.len() {
            return Ok(i);
        }
        let b = line[i];
        if b.is_ascii_digit() {
            let start = i;
            while i < line.len() && line[i].is_ascii_digit() {
                i += 1;
            }
            let text = std::str::from_utf8(&line[start..i]).unwrap();
            let value: u32 = text.parse().map_err(|_| Error::MalformedLineNumber(0))?;
            if value >= 32768 {
                return Err(Error::MalformedLineNumber(value));
            }
            out.push(0x8D);
            out.extend_from_slice(&linenum::encode(value as u16));
            continue;
        }
        match b {
            b' ' | b',' => {
                out.push(b);
                i += 1;
            }
            b'&' => {
                out.push(b);
                i += 1;
                while i < line.len() && line[i].is_ascii_hexdigit() {
                    out.push(line[i]);
                    i += 1;
                }
            }
            _ => return Ok(i),
        }
    }
}

/// Finds the longest match starting at `rest`, trying an exact full
/// keyword name first (scanning every candidate and keeping the
/// longest full-name hit, so e.g. `GET$` matches `GET$` rather than
/// stopping at the shorter `GET`), then falling back to an
/// abbreviation (a valid prefix followed by `.`).
fn match_keyword(rest: &[u8]) -> Option<(u8, usize, KeywordFlags)> {
    let mut best: Option<(u8, usize, KeywordFlags)> = None;
    for abbr in ABBREVIATIONS {
        let name = abbr.full_name.as_bytes();
        if rest.len() >= name.len() && rest[..name.len()] == *name {
            if best.is_none_or(|(_, best_len, _)| name.len() > best_len) {
                let flags = find_by_token(abbr.token).map(|k| k.flags).unwrap_or_default();
                best = Some((abbr.token, name.len(), flags));
            }
        }
    }
    if best.is_some() {
        return best;
    }

    for abbr in ABBREVIATIONS {
        let name = abbr.full_name.as_bytes();
        let search_len = name.len().min(rest.len());
        if let Some(dot_pos) = rest[..search_len].iter().position(|&b| b == b'.') {
            if dot_pos >= abbr.min_len && rest[..dot_pos] == name[..dot_pos] {
                let flags = find_by_token(abbr.token).map(|k| k.flags).unwrap_or_default();
                return Some((abbr.token, dot_pos + 1, flags));
            }
        }
    }
    None
}
