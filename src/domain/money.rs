use thiserror::Error;

/// Money is an integer count of the smallest currency unit (cents for EUR/USD).
/// No floating point anywhere in the ledger.
pub type Cents = i64;

/// Format cents as a decimal string: 5000 -> "50.00", -1234 -> "-12.34".
pub fn format_cents(cents: Cents) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseCentsError {
    #[error("empty amount")]
    Empty,

    #[error("invalid money format: {0}")]
    InvalidFormat(String),

    #[error("amount has more than two decimal places: {0}")]
    TooPrecise(String),

    #[error("amount out of range: {0}")]
    Overflow(String),
}

/// Parse a decimal string into cents: "50" -> 5000, "12.5" -> 1250, ".05" -> 5.
///
/// Unlike a display formatter this is strict: more than two decimals is an error
/// rather than a silent truncation, since the value is about to move money.
pub fn parse_cents(input: &str) -> Result<Cents, ParseCentsError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ParseCentsError::Empty);
    }

    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };

    let (units_str, frac_str) = digits.split_once('.').unwrap_or((digits, ""));
    let all_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if (units_str.is_empty() && frac_str.is_empty()) || !all_digits(units_str) || !all_digits(frac_str)
    {
        return Err(ParseCentsError::InvalidFormat(input.to_string()));
    }
    if frac_str.len() > 2 {
        return Err(ParseCentsError::TooPrecise(input.to_string()));
    }

    let overflow = || ParseCentsError::Overflow(input.to_string());
    let units: i64 = if units_str.is_empty() {
        0
    } else {
        units_str.parse().map_err(|_| overflow())?
    };
    let frac: i64 = match frac_str.len() {
        0 => 0,
        1 => frac_str.parse::<i64>().map_err(|_| overflow())? * 10,
        _ => frac_str.parse().map_err(|_| overflow())?,
    };

    let cents = units
        .checked_mul(100)
        .and_then(|c| c.checked_add(frac))
        .ok_or_else(overflow)?;
    Ok(if negative { -cents } else { cents })
}
