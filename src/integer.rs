use crate::error::CpuError;

/// Radix (base) of integer, as determined by the optional `0x` prefix.
#[derive(Clone, Copy, PartialEq, Debug)]
enum Radix {
    Decimal = 10,
    Hex = 16,
}

/// Parse an integer literal into a 64-bit word.
///
/// Accepts:
///  - Decimal digits. Eg. "42".
///  - Hex digits after a `0x` or `0X` prefix. Eg. "0x2A".
///  - A single leading `-` before decimal digits, stored as two's complement. Eg. "-1".
///
/// Rejects with [`CpuError::MalformedLiteral`]:
///  - Empty strings and bare prefixes. Eg. "", "0x", "-".
///  - Any character that is not a digit of the radix, including trailing garbage. Eg. "12ab".
///  - Values that do not fit in 64 bits.
pub fn parse_literal(string: &str) -> Result<u64, CpuError> {
    let malformed = || CpuError::MalformedLiteral {
        literal: string.to_owned(),
    };

    let (negative, rest) = match string.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, string),
    };
    let (radix, digits) = match rest
        .strip_prefix("0x")
        .or_else(|| rest.strip_prefix("0X"))
    {
        Some(digits) => (Radix::Hex, digits),
        None => (Radix::Decimal, rest),
    };

    // Negative hex has no meaning for a word literal
    if negative && radix == Radix::Hex {
        return Err(malformed());
    }
    // `from_str_radix` would otherwise accept a second sign
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix as u32)) {
        return Err(malformed());
    }

    let magnitude = u64::from_str_radix(digits, radix as u32).map_err(|_| malformed())?;
    if negative {
        Ok(magnitude.wrapping_neg())
    } else {
        Ok(magnitude)
    }
}
