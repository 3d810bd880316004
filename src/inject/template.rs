//! Named-field substitution for build descriptor templates.
//!
//! Only the `device` root is addressable. Fields are reached with item
//! access (`{device[wifi][ssid]}`) or attribute access (`{device.identity}`);
//! `{{` and `}}` produce literal braces. Conversions and format specs are
//! not supported.

use serde_json::{Map, Value};
use thiserror::Error;

const ROOT: &str = "device";

/// Errors raised while rendering a template.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum TemplateError {
    /// Raised for a `{` or `}` that is neither doubled nor part of a field.
    #[error("unbalanced brace at byte {offset}")]
    UnbalancedBrace {
        /// Byte offset of the offending brace.
        offset: usize,
    },
    /// Raised when a replacement field cannot be parsed.
    #[error("invalid replacement field {{{field}}}")]
    InvalidField {
        /// Field text between the braces.
        field: String,
    },
    /// Raised when a field names something other than `device`.
    #[error("unknown template root {name:?} in {{{field}}}")]
    UnknownRoot {
        /// Root name used.
        name: String,
        /// Field text between the braces.
        field: String,
    },
    /// Raised when a field path does not exist on the device.
    #[error("device has no field for {{{field}}}")]
    UnknownField {
        /// Field text between the braces.
        field: String,
    },
    /// Raised when a field resolves to an object or array.
    #[error("{{{field}}} does not resolve to a scalar value")]
    NotScalar {
        /// Field text between the braces.
        field: String,
    },
}

/// Renders `template` against the device fields.
///
/// # Errors
///
/// Returns a [`TemplateError`] for malformed templates and for fields that do
/// not resolve to a scalar on `device`.
pub fn render_template(template: &str, device: &Map<String, Value>) -> Result<String, TemplateError> {
    let mut rendered = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((offset, ch)) = chars.next() {
        match ch {
            '{' if chars.next_if(|&(_, next)| next == '{').is_some() => rendered.push('{'),
            '}' if chars.next_if(|&(_, next)| next == '}').is_some() => rendered.push('}'),
            '{' => {
                let mut field = String::new();
                loop {
                    match chars.next() {
                        Some((_, '}')) => break,
                        Some((_, '{')) | None => return Err(TemplateError::UnbalancedBrace { offset }),
                        Some((_, other)) => field.push(other),
                    }
                }
                rendered.push_str(&resolve(&field, device)?);
            }
            '}' => return Err(TemplateError::UnbalancedBrace { offset }),
            other => rendered.push(other),
        }
    }

    Ok(rendered)
}

fn resolve(field: &str, device: &Map<String, Value>) -> Result<String, TemplateError> {
    let (root, keys) = parse_field(field)?;
    if root != ROOT {
        return Err(TemplateError::UnknownRoot {
            name: root,
            field: field.to_owned(),
        });
    }

    let unknown = || TemplateError::UnknownField {
        field: field.to_owned(),
    };
    let mut path = keys.iter();
    let Some(first) = path.next() else {
        return Err(TemplateError::NotScalar {
            field: field.to_owned(),
        });
    };
    let mut current = device.get(first).ok_or_else(unknown)?;
    for key in path {
        current = match current {
            Value::Object(map) => map.get(key),
            Value::Array(items) => key.parse::<usize>().ok().and_then(|index| items.get(index)),
            _ => None,
        }
        .ok_or_else(unknown)?;
    }

    match current {
        Value::String(text) => Ok(text.clone()),
        Value::Null => Ok(String::new()),
        Value::Bool(_) | Value::Number(_) => Ok(current.to_string()),
        Value::Array(_) | Value::Object(_) => Err(TemplateError::NotScalar {
            field: field.to_owned(),
        }),
    }
}

/// Splits `device[wifi].ssid` into `("device", ["wifi", "ssid"])`.
fn parse_field(field: &str) -> Result<(String, Vec<String>), TemplateError> {
    let invalid = || TemplateError::InvalidField {
        field: field.to_owned(),
    };
    let mut chars = field.chars().peekable();
    let root = take_name(&mut chars);
    if root.is_empty() {
        return Err(invalid());
    }

    let mut keys = Vec::new();
    while let Some(ch) = chars.next() {
        match ch {
            '.' => {
                let name = take_name(&mut chars);
                if name.is_empty() {
                    return Err(invalid());
                }
                keys.push(name);
            }
            '[' => {
                let mut key = String::new();
                loop {
                    match chars.next() {
                        Some(']') => break,
                        Some(other) => key.push(other),
                        None => return Err(invalid()),
                    }
                }
                if key.is_empty() {
                    return Err(invalid());
                }
                keys.push(key);
            }
            _ => return Err(invalid()),
        }
    }

    Ok((root, keys))
}

fn take_name(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut name = String::new();
    while let Some(ch) = chars.next_if(|ch| ch.is_alphanumeric() || *ch == '_') {
        name.push(ch);
    }
    name
}
