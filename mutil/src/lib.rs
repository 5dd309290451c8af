//! Small shared helpers used across the MSP430 toolchain: a big-endian alias
//! for `byteorder`, a parse-enum error type, signed/unsigned wrap helpers for
//! the 16/8-bit values the core works with, and a minimal regex-substitution
//! template engine used by the disassembler's reverse-emulation rewrite.

use std::error::Error;
use std::fmt;

/// The toolchain's wire format and in-memory word layout are both big-endian
/// (high byte first), unlike most byteorder-based toolchains in this family.
pub type Endian = byteorder::BigEndian;

/// Error returned by a generated `FromStr` impl for a closed enum (mnemonic,
/// register alias, ...) when the input does not match any variant.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct ParseEnumError {
    pub value: String,
    pub enum_name: &'static str,
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "'{}' is not a valid {}",
            &self.value, &self.enum_name
        )
    }
}

impl Error for ParseEnumError {}

/// Wraps a signed 16-bit value into its unsigned bit pattern.
#[inline]
pub fn wrap_u16(value: i32) -> u16 {
    (value as i64 & 0xFFFF) as u16
}

/// Sign-extends a raw 16-bit pattern to a signed value.
#[inline]
pub fn sign_extend16(value: u16) -> i32 {
    value as i16 as i32
}

/// Wraps a signed 8-bit value into its unsigned bit pattern.
#[inline]
pub fn wrap_u8(value: i32) -> u8 {
    (value as i64 & 0xFF) as u8
}

/// Sign-extends a raw 8-bit pattern to a signed value.
#[inline]
pub fn sign_extend8(value: u8) -> i32 {
    value as i8 as i32
}

/// Sign-extends an arbitrary-width two's-complement field (e.g. the 10-bit
/// jump offset) held in the low `bits` bits of `value`.
#[inline]
pub fn sign_extend(value: u32, bits: u32) -> i32 {
    let shift = 32 - bits;
    ((value << shift) as i32) >> shift
}

/// Formats a 16-bit value as `0xAAAA`.
pub fn hex16(value: u16) -> String {
    format!("0x{:04X}", value)
}

/// Formats an 8-bit value as `0xAA`.
pub fn hex8(value: u8) -> String {
    format!("0x{:02X}", value)
}

/// A compiled substitution template: a literal/backreference piece-list built
/// once from a template string such as `"ADC$bw $dst"` or `"RET"`, then
/// rendered against a regex [`Captures`](regex::Captures) value. Supports
/// numbered (`$1`) and named (`$name`) backreferences, matching the subset of
/// `regex::Regex::replace`'s template syntax this toolchain needs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubstTemplate {
    pieces: Vec<Piece>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Piece {
    Literal(String),
    Numbered(usize),
    Named(String),
}

impl SubstTemplate {
    /// Compiles a template string. `$name` and `${name}` reference a named
    /// capture group; `$1`..`$9` reference a numbered group; `$$` is a
    /// literal dollar sign.
    pub fn compile(template: &str) -> SubstTemplate {
        let mut pieces = Vec::new();
        let mut literal = String::new();
        let chars: Vec<char> = template.chars().collect();
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            if c == '$' && i + 1 < chars.len() {
                let next = chars[i + 1];
                if next == '$' {
                    literal.push('$');
                    i += 2;
                    continue;
                }
                if next == '{' {
                    if let Some(end) = chars[i + 2..].iter().position(|&c| c == '}') {
                        let name: String = chars[i + 2..i + 2 + end].iter().collect();
                        flush_literal(&mut pieces, &mut literal);
                        pieces.push(Piece::Named(name));
                        i += 2 + end + 1;
                        continue;
                    }
                }
                if next.is_ascii_digit() {
                    let mut end = i + 1;
                    while end < chars.len() && chars[end].is_ascii_digit() {
                        end += 1;
                    }
                    let num: usize = chars[i + 1..end].iter().collect::<String>().parse().unwrap();
                    flush_literal(&mut pieces, &mut literal);
                    pieces.push(Piece::Numbered(num));
                    i = end;
                    continue;
                }
                if next.is_alphabetic() || next == '_' {
                    let mut end = i + 1;
                    while end < chars.len() && (chars[end].is_alphanumeric() || chars[end] == '_') {
                        end += 1;
                    }
                    let name: String = chars[i + 1..end].iter().collect();
                    flush_literal(&mut pieces, &mut literal);
                    pieces.push(Piece::Named(name));
                    i = end;
                    continue;
                }
            }
            literal.push(c);
            i += 1;
        }

        flush_literal(&mut pieces, &mut literal);
        SubstTemplate { pieces }
    }

    /// Renders this template against the given captures, treating a missing
    /// or unmatched group as an empty string.
    pub fn render(&self, captures: &regex::Captures) -> String {
        let mut out = String::new();
        for piece in &self.pieces {
            match piece {
                Piece::Literal(s) => out.push_str(s),
                Piece::Numbered(n) => {
                    if let Some(m) = captures.get(*n) {
                        out.push_str(m.as_str());
                    }
                }
                Piece::Named(name) => {
                    if let Some(m) = captures.name(name) {
                        out.push_str(m.as_str());
                    }
                }
            }
        }
        out
    }
}

fn flush_literal(pieces: &mut Vec<Piece>, literal: &mut String) {
    if !literal.is_empty() {
        pieces.push(Piece::Literal(std::mem::take(literal)));
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use regex::Regex;

    #[test]
    fn wrap_and_sign_extend_roundtrip() {
        assert_eq!(wrap_u16(-1), 0xFFFF);
        assert_eq!(sign_extend16(0xFFFF), -1);
        assert_eq!(wrap_u8(-1), 0xFF);
        assert_eq!(sign_extend8(0xFF), -1);
    }

    #[test]
    fn sign_extend_ten_bits() {
        assert_eq!(sign_extend(0x3FF, 10), -1);
        assert_eq!(sign_extend(0x200, 10), -512);
        assert_eq!(sign_extend(0x001, 10), 1);
    }

    #[test]
    fn hex_formatting() {
        assert_eq!(hex16(0x1234), "0x1234");
        assert_eq!(hex8(0xAB), "0xAB");
    }

    #[test]
    fn template_numbered_and_named() {
        let re = Regex::new(r"ADDC\.b #0,(?P<dst>\w+)").unwrap();
        let template = SubstTemplate::compile("ADC.b $dst");
        let caps = re.captures("ADDC.b #0,R5").unwrap();
        assert_eq!(template.render(&caps), "ADC.b R5");
    }

    #[test]
    fn template_literal_dollar() {
        let re = Regex::new(r"X").unwrap();
        let template = SubstTemplate::compile("price: $$5");
        let caps = re.captures("X").unwrap();
        assert_eq!(template.render(&caps), "price: $5");
    }
}
