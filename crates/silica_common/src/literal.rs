//! Constant-literal parsing and formatting.
//!
//! The front-end accepts bit-exact constant literals in binary (`0b1010`),
//! hexadecimal (`0xAF`), and decimal (`42`) notation, with `'` as an
//! ignored digit separator. Binary and hex literals fix the width from the
//! digit count; decimal literals take the minimal width of their value.

use crate::state::{BitVectorState, Plane};

/// Errors raised while parsing a constant literal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LiteralError {
    /// A digit outside the literal's base.
    #[error("invalid digit '{digit}' for base {base}")]
    InvalidDigit {
        /// The offending character.
        digit: char,
        /// The base of the literal.
        base: u32,
    },

    /// A decimal literal that does not fit into 64 bits.
    #[error("decimal literal overflows 64 bits")]
    Overflow,

    /// A literal with no digits.
    #[error("literal has no digits")]
    Empty,

    /// A decimal literal with a leading zero (other than `"0"` itself).
    #[error("decimal literal has a leading zero")]
    LeadingZero,
}

/// Parses a constant literal into a fully defined [`BitVectorState`].
///
/// - `0b`/`0B` prefix: binary, one bit per digit.
/// - `0x`/`0X` prefix: hexadecimal, four bits per digit.
/// - otherwise: decimal, minimal width, must fit into 64 bits, and must not
///   have a leading zero except for the literal `"0"`.
///
/// `'` is allowed as a digit separator anywhere after the prefix.
pub fn parse_literal(text: &str) -> Result<BitVectorState, LiteralError> {
    if let Some(digits) = strip_prefix(text, "0b", "0B") {
        parse_binary(digits)
    } else if let Some(digits) = strip_prefix(text, "0x", "0X") {
        parse_hex(digits)
    } else {
        parse_decimal(text)
    }
}

fn strip_prefix<'a>(text: &'a str, lower: &str, upper: &str) -> Option<&'a str> {
    text.strip_prefix(lower).or_else(|| text.strip_prefix(upper))
}

fn digits_of(text: &str) -> impl Iterator<Item = char> + '_ {
    text.chars().filter(|&c| c != '\'')
}

fn parse_binary(text: &str) -> Result<BitVectorState, LiteralError> {
    let digits: Vec<char> = digits_of(text).collect();
    if digits.is_empty() {
        return Err(LiteralError::Empty);
    }
    let width = digits.len();
    let mut state = BitVectorState::undefined(width);
    for (i, &c) in digits.iter().rev().enumerate() {
        let bit = match c {
            '0' => false,
            '1' => true,
            _ => return Err(LiteralError::InvalidDigit { digit: c, base: 2 }),
        };
        state.set(Plane::Value, i, bit);
        state.set(Plane::Defined, i, true);
    }
    Ok(state)
}

fn parse_hex(text: &str) -> Result<BitVectorState, LiteralError> {
    let digits: Vec<char> = digits_of(text).collect();
    if digits.is_empty() {
        return Err(LiteralError::Empty);
    }
    let width = digits.len() * 4;
    let mut state = BitVectorState::undefined(width);
    for (i, &c) in digits.iter().rev().enumerate() {
        let nibble = c
            .to_digit(16)
            .ok_or(LiteralError::InvalidDigit { digit: c, base: 16 })? as u64;
        state.insert_nonstraddling(Plane::Value, i * 4, 4, nibble);
        state.insert_nonstraddling(Plane::Defined, i * 4, 4, 0xF);
    }
    Ok(state)
}

fn parse_decimal(text: &str) -> Result<BitVectorState, LiteralError> {
    let digits: Vec<char> = digits_of(text).collect();
    if digits.is_empty() {
        return Err(LiteralError::Empty);
    }
    if digits.len() > 1 && digits[0] == '0' {
        return Err(LiteralError::LeadingZero);
    }
    let mut value: u64 = 0;
    for &c in &digits {
        let d = c
            .to_digit(10)
            .ok_or(LiteralError::InvalidDigit { digit: c, base: 10 })? as u64;
        value = value
            .checked_mul(10)
            .and_then(|v| v.checked_add(d))
            .ok_or(LiteralError::Overflow)?;
    }
    let width = (64 - value.leading_zeros()).max(1) as usize;
    Ok(BitVectorState::from_u64(value, width))
}

/// Formats a fully defined state as a binary literal (`0b...`).
///
/// Undefined bits render as `X`; such output will not re-parse.
pub fn format_binary(state: &BitVectorState) -> String {
    format!("0b{state}")
}

/// Formats a state as a hex literal (`0x...`), if its width is a multiple of
/// four and every nibble is fully defined or fully undefined.
pub fn format_hex(state: &BitVectorState) -> Option<String> {
    if state.len() % 4 != 0 || state.is_empty() {
        return None;
    }
    let mut out = String::from("0x");
    for nibble_idx in (0..state.len() / 4).rev() {
        let start = nibble_idx * 4;
        if state.all_defined(start, 4) {
            let v = state.extract(start, 4).to_u64()?;
            out.push(char::from_digit(v as u32, 16)?.to_ascii_uppercase());
        } else if (start..start + 4).all(|i| !state.get(Plane::Defined, i)) {
            out.push('X');
        } else {
            return None;
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_bit_literals() {
        assert_eq!(parse_literal("0").unwrap().len(), 1);
        assert_eq!(parse_literal("1").unwrap().to_u64(), Some(1));
    }

    #[test]
    fn binary_width_from_digits() {
        let s = parse_literal("0b0011").unwrap();
        assert_eq!(s.len(), 4);
        assert_eq!(s.to_u64(), Some(0b0011));
    }

    #[test]
    fn binary_uppercase_prefix() {
        let s = parse_literal("0B10").unwrap();
        assert_eq!(s.to_u64(), Some(2));
    }

    #[test]
    fn hex_width_from_digits() {
        let s = parse_literal("0xAF").unwrap();
        assert_eq!(s.len(), 8);
        assert_eq!(s.to_u64(), Some(0xAF));
    }

    #[test]
    fn separators_ignored() {
        let s = parse_literal("0b1010'0101").unwrap();
        assert_eq!(s.len(), 8);
        assert_eq!(s.to_u64(), Some(0xA5));
        let d = parse_literal("1'000").unwrap();
        assert_eq!(d.to_u64(), Some(1000));
    }

    #[test]
    fn decimal_minimal_width() {
        assert_eq!(parse_literal("5").unwrap().len(), 3);
        assert_eq!(parse_literal("255").unwrap().len(), 8);
        assert_eq!(parse_literal("256").unwrap().len(), 9);
    }

    #[test]
    fn decimal_zero() {
        let s = parse_literal("0").unwrap();
        assert_eq!(s.len(), 1);
        assert_eq!(s.to_u64(), Some(0));
    }

    #[test]
    fn decimal_leading_zero_rejected() {
        assert_eq!(parse_literal("007"), Err(LiteralError::LeadingZero));
    }

    #[test]
    fn invalid_digits() {
        assert_eq!(
            parse_literal("0b012"),
            Err(LiteralError::InvalidDigit { digit: '2', base: 2 })
        );
        assert_eq!(
            parse_literal("0xGG"),
            Err(LiteralError::InvalidDigit { digit: 'G', base: 16 })
        );
        assert_eq!(
            parse_literal("12a"),
            Err(LiteralError::InvalidDigit { digit: 'a', base: 10 })
        );
    }

    #[test]
    fn decimal_overflow() {
        assert_eq!(
            parse_literal("18446744073709551616"), // 2^64
            Err(LiteralError::Overflow)
        );
        assert!(parse_literal("18446744073709551615").is_ok());
    }

    #[test]
    fn empty_literals() {
        assert_eq!(parse_literal("0b"), Err(LiteralError::Empty));
        assert_eq!(parse_literal("0x''"), Err(LiteralError::Empty));
        assert_eq!(parse_literal(""), Err(LiteralError::Empty));
    }

    #[test]
    fn binary_roundtrip() {
        let s = parse_literal("0b1010'0101").unwrap();
        assert_eq!(format_binary(&s), "0b10100101");
        assert_eq!(parse_literal(&format_binary(&s)).unwrap(), s);
    }

    #[test]
    fn hex_roundtrip() {
        let s = parse_literal("0xdead").unwrap();
        assert_eq!(format_hex(&s).unwrap(), "0xDEAD");
        assert_eq!(parse_literal(&format_hex(&s).unwrap()).unwrap(), s);
    }

    #[test]
    fn hex_format_requires_nibble_width() {
        let s = parse_literal("0b101").unwrap();
        assert_eq!(format_hex(&s), None);
    }
}
