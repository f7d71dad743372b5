//! One-replacement-per-line UTF-8 text files.
//!
//! Script text may itself contain line breaks, so `\n`, `\r` and `\` are
//! written as the escapes `\n`, `\r` and `\\`.  Any other backslash
//! sequence is read back literally.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

/// Read one string per line, `\n` or `\r\n` terminated.
pub fn read_lines<P: AsRef<Path>>(path: P) -> io::Result<Vec<String>> {
    Ok(parse_lines(&fs::read_to_string(path)?))
}

pub fn parse_lines(content: &str) -> Vec<String> {
    content.lines().map(unescape).collect()
}

/// Write each text on its own line.
pub fn write_lines<P: AsRef<Path>, S: AsRef<str>>(path: P, texts: &[S]) -> io::Result<()> {
    let mut out = io::BufWriter::new(fs::File::create(path)?);
    for text in texts {
        writeln!(out, "{}", escape(text.as_ref()))?;
    }
    out.flush()
}

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

pub fn unescape(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
