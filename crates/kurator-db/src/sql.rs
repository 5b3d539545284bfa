//! SQL fragment rendering
//!
//! The load layer composes its statements at runtime from catalog metadata
//! and CSV field values, so identifiers and literals always pass through
//! these helpers.

/// Render an identifier, doubling embedded double quotes.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Render a string literal, doubling embedded single quotes.
pub(crate) fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Render a CSV field as a literal. Empty fields load as NULL, the same
/// convention COPY applies to CSV input.
pub(crate) fn literal_or_null(value: &str) -> String {
    if value.is_empty() {
        "NULL".to_string()
    } else {
        quote_literal(value)
    }
}
