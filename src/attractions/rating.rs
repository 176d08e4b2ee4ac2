//! Rating normalization and the sort key used by the rating orders.
//!
//! Ratings are stored as text such as `"87%"`. Sorting puts rows rated
//! exactly `"100%"` first in both directions, then orders the rest by the
//! numeric value of the rating with the `%` removed.

use rusqlite::{Connection, functions::FunctionFlags, types::ValueRef};

/// Textual rating that always sorts first.
pub const PERFECT_RATING: &str = "100%";

/// SQL name of the numeric rating function.
pub const RATING_VALUE_FN: &str = "rating_value";
/// SQL name of the perfect-rating predicate.
pub const PERFECT_RATING_FN: &str = "is_perfect_rating";

#[must_use]
pub fn is_perfect_rating(rating: Option<&str>) -> bool {
    rating == Some(PERFECT_RATING)
}

/// Numeric value of a textual rating.
///
/// Every `%` is removed, then the text is read the way SQLite casts text to
/// REAL: leading whitespace is skipped, the longest numeric prefix is used and
/// text without one is `0.0`.
#[must_use]
pub fn rating_value(rating: &str) -> f64 {
    let stripped = rating.replace('%', "");
    numeric_prefix(stripped.trim_start()).parse().unwrap_or(0.0)
}

fn numeric_prefix(text: &str) -> &str {
    let bytes = text.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end += 1;
    }
    let digits_start = end;
    while bytes.get(end).is_some_and(u8::is_ascii_digit) {
        end += 1;
    }
    let mut mantissa_digits = end - digits_start;
    if bytes.get(end) == Some(&b'.') {
        let fraction_start = end + 1;
        let mut cursor = fraction_start;
        while bytes.get(cursor).is_some_and(u8::is_ascii_digit) {
            cursor += 1;
        }
        mantissa_digits += cursor - fraction_start;
        if mantissa_digits > 0 {
            end = cursor;
        }
    }
    if mantissa_digits == 0 {
        return "";
    }

    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut cursor = end + 1;
        if matches!(bytes.get(cursor), Some(b'+' | b'-')) {
            cursor += 1;
        }
        let exponent_start = cursor;
        while bytes.get(cursor).is_some_and(u8::is_ascii_digit) {
            cursor += 1;
        }
        if cursor > exponent_start {
            end = cursor;
        }
    }

    &text[..end]
}

/// Register the rating functions on a connection so ORDER BY clauses can use them.
///
/// # Errors
///
/// Returns the SQLite error if a function cannot be registered.
pub fn register_functions(connection: &Connection) -> rusqlite::Result<()> {
    let flags = FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC;

    connection.create_scalar_function(RATING_VALUE_FN, 1, flags, |ctx| {
        #[allow(clippy::cast_precision_loss)]
        let value = match ctx.get_raw(0) {
            ValueRef::Null => None,
            ValueRef::Integer(number) => Some(number as f64),
            ValueRef::Real(number) => Some(number),
            ValueRef::Text(text) | ValueRef::Blob(text) => {
                Some(rating_value(&String::from_utf8_lossy(text)))
            }
        };
        Ok(value)
    })?;

    connection.create_scalar_function(PERFECT_RATING_FN, 1, flags, |ctx| {
        Ok(match ctx.get_raw(0) {
            ValueRef::Text(text) => is_perfect_rating(std::str::from_utf8(text).ok()),
            _ => false,
        })
    })
}
