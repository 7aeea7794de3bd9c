//! Identifier and SQL fragment validation.
//!
//! Identifiers cannot be bound as parameters, so every name spliced into
//! generated SQL passes the [`validate_identifier`] allow-list first and is
//! then quoted by the dialect. Data types and default expressions cannot be
//! quoted at all and go through the fragment checks below.

use crate::error::{DbError, DbResult};

/// Longest identifier accepted on any supported engine (SQL Server's limit).
pub const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Whether `c` may appear in an identifier: any letter or digit, a space, or
/// one of `_ $ # @ -`.
fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, ' ' | '_' | '$' | '#' | '@' | '-')
}

/// Validate a table, schema, column or constraint name.
pub fn validate_identifier(name: &str) -> DbResult<()> {
    if name.is_empty() {
        return Err(DbError::invalid_input("Identifier cannot be empty"));
    }
    if name.chars().count() > MAX_IDENTIFIER_LENGTH {
        return Err(DbError::invalid_input(format!(
            "Identifier exceeds {} characters: {:?}",
            MAX_IDENTIFIER_LENGTH, name
        )));
    }
    if let Some(bad) = name.chars().find(|c| !is_identifier_char(*c)) {
        return Err(DbError::invalid_input(format!(
            "Identifier {:?} contains unsupported character {:?}",
            name, bad
        )));
    }
    Ok(())
}

/// Validate every name in `names`.
pub fn validate_identifiers<'a>(names: impl IntoIterator<Item = &'a str>) -> DbResult<()> {
    names.into_iter().try_for_each(validate_identifier)
}

/// Validate a column data type such as `varchar(255)` or `numeric(10, 2)`.
pub fn validate_type_fragment(data_type: &str) -> DbResult<()> {
    let trimmed = data_type.trim();
    if trimmed.is_empty() {
        return Err(DbError::invalid_input("Data type cannot be empty"));
    }
    let allowed = |c: char| {
        c.is_ascii_alphanumeric() || matches!(c, ' ' | '_' | '(' | ')' | ',' | '[' | ']' | '.')
    };
    if let Some(bad) = trimmed.chars().find(|c| !allowed(*c)) {
        return Err(DbError::invalid_input(format!(
            "Data type {:?} contains unsupported character {:?}",
            data_type, bad
        )));
    }
    Ok(())
}

/// Validate a column default expression.
///
/// Defaults may be literals or function calls, so only statement separators and
/// comment markers are rejected.
pub fn validate_default_expression(expr: &str) -> DbResult<()> {
    if expr.trim().is_empty() {
        return Err(DbError::invalid_input("Default expression cannot be empty"));
    }
    for pattern in [";", "--", "/*", "*/"] {
        if expr.contains(pattern) {
            return Err(DbError::invalid_input(format!(
                "Default expression may not contain {:?}",
                pattern
            )));
        }
    }
    if expr.chars().any(char::is_control) {
        return Err(DbError::invalid_input(
            "Default expression contains control characters",
        ));
    }
    Ok(())
}
