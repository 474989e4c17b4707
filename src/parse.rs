//! Numeric reading and unit extraction from recognized text.

/// A number found in recognized text, with its unit.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedReading {
    pub value: f64,
    pub unit: Option<String>,
    pub raw_text: String,
}

/// First reading token and its optional unit, borrowed from the input.
struct Match<'a> {
    number: &'a str,
    unit: Option<&'a str>,
}

fn is_unit_char(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '%'
}

/// Locate the first `digits[(.|,)digits][whitespace*][unit]` token.
fn find_first(text: &str) -> Option<Match<'_>> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let rest = &text[start..];

    let int_len = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    let mut end = int_len;

    // A separator only counts when digits follow it.
    let after_int = &rest[int_len..];
    if let Some(sep) = after_int.chars().next()
        && (sep == '.' || sep == ',')
    {
        let fraction = &after_int[1..];
        let frac_len = fraction
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(fraction.len());
        if frac_len > 0 {
            end = int_len + 1 + frac_len;
        }
    }

    let number = &rest[..end];
    let tail = rest[end..].trim_start();
    let unit_len = tail.find(|c: char| !is_unit_char(c)).unwrap_or(tail.len());
    let unit = (unit_len > 0).then(|| &tail[..unit_len]);

    Some(Match { number, unit })
}

/// Extract the first reading from `text`.
///
/// Returns `None` when the text has no numeric token or the token does not
/// convert to a finite number. A missing unit falls back to `default_unit`.
/// Only the first match is considered.
pub fn parse_reading(text: &str, default_unit: Option<&str>) -> Option<ParsedReading> {
    let found = find_first(text)?;
    let normalized = found.number.replace(',', ".");
    let value: f64 = normalized.parse().ok()?;
    if !value.is_finite() {
        return None;
    }

    let unit = found
        .unit
        .or(default_unit)
        .map(str::to_string);

    Some(ParsedReading {
        value,
        unit,
        raw_text: text.to_string(),
    })
}
