//! Phone number normalization used as a dedup key.

use std::sync::LazyLock;

use regex::Regex;

/// Trailing extensions such as `ext. 12`, `x12` or `#12`.
static EXTENSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s*(?:ext\.?|extension|x|#)\s*\d{1,6}\s*$").unwrap());

const MIN_DIGITS: usize = 7;
const MAX_DIGITS: usize = 15;

/// Normalizes a raw phone number to `+<country><subscriber>` form.
///
/// Numbers without `+` or `00` are national. A national number of more
/// than 10 digits that starts with the default country code is read as
/// already carrying it; shorter ones always get the code prepended, so
/// `1 555 0100` and `+1 555 0100` are different numbers.
///
/// Returns `None` when the number does not yield 7 to 15 digits, in which
/// case the candidate has no phone key.
pub fn normalize(raw: &str, default_country_code: &str) -> Option<String> {
    let trimmed = EXTENSION.replace(raw.trim(), "");
    let international = trimmed.starts_with('+');
    let digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }

    let cc = default_country_code.trim_start_matches('+');
    let full = if international {
        digits
    } else if let Some(rest) = digits.strip_prefix("00") {
        rest.to_string()
    } else if let Some(rest) = digits.strip_prefix('0') {
        // National trunk prefix.
        format!("{}{}", cc, rest)
    } else if digits.len() > 10 && digits.starts_with(cc) {
        digits
    } else {
        format!("{}{}", cc, digits)
    };

    if !(MIN_DIGITS..=MAX_DIGITS).contains(&full.len()) {
        return None;
    }
    Some(format!("+{}", full))
}

/// Masks a phone number for log output, keeping the first four characters.
pub fn redact(phone: &str) -> String {
    let prefix: String = phone.chars().take(4).collect();
    format!("{}****", prefix)
}
