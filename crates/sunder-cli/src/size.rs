//! Human-readable size arguments.
//!
//! Sizes are an integer followed by an optional unit (`k`, `m`, `g`, `t`,
//! `p`, powers of 1024) and an optional trailing `b`, case-insensitive:
//! `4096`, `64k`, `1MB`, `2g`.

const UNIT: u64 = 1024;

/// Parse a size string into bytes.
///
/// # Errors
///
/// Returns a message if the string is empty, not a number, uses an unknown
/// unit, overflows `u64`, or is zero.
pub fn parse_size(input: &str) -> Result<u64, String> {
    let trimmed = input.trim();
    let lower = trimmed.to_ascii_lowercase();

    // "b" alone is a unit only after a digit or another unit letter
    let without_b = match lower.strip_suffix('b') {
        Some(rest) if !rest.is_empty() => rest,
        _ => lower.as_str(),
    };

    let (digits, multiplier) = match without_b.chars().last() {
        None => return Err("size is empty".to_string()),
        Some(c) if c.is_ascii_digit() => (without_b, 1),
        Some(c) => {
            let exponent = match c {
                'k' => 1,
                'm' => 2,
                'g' => 3,
                't' => 4,
                'p' => 5,
                _ => return Err(format!("unknown size unit '{c}' in '{trimmed}'")),
            };
            (&without_b[..without_b.len() - 1], UNIT.pow(exponent))
        }
    };

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("invalid size '{trimmed}'"));
    }

    let value: u64 = digits
        .parse()
        .map_err(|_| format!("size '{trimmed}' is too large"))?;
    let bytes = value
        .checked_mul(multiplier)
        .ok_or_else(|| format!("size '{trimmed}' is too large"))?;

    if bytes == 0 {
        return Err("size must be greater than zero".to_string());
    }

    Ok(bytes)
}

/// Parse a buffer size, which must also fit in memory addressing
pub fn parse_buffer_size(input: &str) -> Result<usize, String> {
    let bytes = parse_size(input)?;
    usize::try_from(bytes).map_err(|_| format!("buffer size '{input}' is too large"))
}
