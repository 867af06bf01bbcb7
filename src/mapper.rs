//! Derives the marketplace form payload from an AI result.

use serde_json::{Map, Value};

use crate::schema::{AvitoFields, ValidationError, json_kind};

pub const MAX_TITLE_CHARS: usize = 100;
pub const MAX_DESCRIPTION_CHARS: usize = 3000;

// Specs values copied into the form when the AI result has them.
const CARRIED_SPECS: [&str; 4] = ["year", "mileage_km", "transmission", "horsepower"];

/// Builds `{title, description, photos, <specs values>, <avito_fields>}`.
///
/// Text is cleaned and truncated; marketplace fields win over anything
/// with the same key. All problems are reported together.
pub fn map_to_avito(ai_result: &Value, photo_files: &[String]) -> Result<Value, Vec<ValidationError>> {
    let mut errors = Vec::new();

    let title = required_text(ai_result, "title", &mut errors);
    let description = required_text(ai_result, "description", &mut errors);

    let fields = match ai_result.get("avito_fields") {
        Some(Value::Object(fields)) => Some(fields),
        None | Some(Value::Null) => {
            errors.push(ValidationError::missing("avito_fields"));
            None
        }
        Some(other) => {
            errors.push(ValidationError::TypeMismatch {
                field: "avito_fields".into(),
                expected: "object".into(),
                found: json_kind(other).into(),
            });
            None
        }
    };
    if let Some(fields) = fields {
        for key in AvitoFields::REQUIRED {
            if is_blank(fields.get(key)) {
                errors.push(ValidationError::missing(format!("avito_fields.{key}")));
            }
        }
    }

    let photos: Vec<Value> = photo_files
        .iter()
        .filter(|p| !p.trim().is_empty())
        .map(|p| Value::String(p.clone()))
        .collect();
    if photos.is_empty() {
        errors.push(ValidationError::missing("photos"));
    }

    let (Some(title), Some(description), Some(fields), true) =
        (title, description, fields, errors.is_empty())
    else {
        return Err(errors);
    };

    let mut mapped = Map::new();
    mapped.insert("title".into(), Value::String(clean_text(title, MAX_TITLE_CHARS)));
    mapped.insert(
        "description".into(),
        Value::String(clean_text(description, MAX_DESCRIPTION_CHARS)),
    );
    mapped.insert("photos".into(), Value::Array(photos));
    if let Some(specs) = ai_result.get("specs").and_then(Value::as_object) {
        for key in CARRIED_SPECS {
            if let Some(value) = specs.get(key).filter(|v| !v.is_null()) {
                mapped.insert(key.into(), value.clone());
            }
        }
    }
    for (key, value) in fields {
        mapped.insert(key.clone(), value.clone());
    }
    Ok(Value::Object(mapped))
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

fn required_text<'a>(
    ai_result: &'a Value,
    key: &str,
    errors: &mut Vec<ValidationError>,
) -> Option<&'a str> {
    match ai_result.get(key).and_then(Value::as_str) {
        Some(text) if !text.trim().is_empty() => Some(text),
        _ => {
            errors.push(ValidationError::missing(key));
            None
        }
    }
}

/// Normalizes listing text: line endings to `\n`, tab-like runs to a space,
/// at most one blank line in a row, single spaces, trimmed, then cut to
/// `max_chars` characters.
pub fn clean_text(text: &str, max_chars: usize) -> String {
    let text = text.replace("\r\n", "\n").replace('\r', "\n");

    let mut cleaned = String::with_capacity(text.len());
    let mut newlines = 0;
    let mut pending_space = false;
    for ch in text.chars() {
        match ch {
            '\n' => {
                pending_space = false;
                newlines += 1;
                if newlines <= 2 {
                    cleaned.push('\n');
                }
            }
            // Whitespace-only lines still count towards the blank-line limit.
            ' ' | '\t' | '\u{0B}' | '\u{0C}' => pending_space = true,
            _ => {
                if pending_space {
                    cleaned.push(' ');
                    pending_space = false;
                }
                newlines = 0;
                cleaned.push(ch);
            }
        }
    }

    let trimmed = cleaned.trim();
    match trimmed.char_indices().nth(max_chars) {
        Some((cut, _)) => trimmed[..cut].trim_end().to_string(),
        None => trimmed.to_string(),
    }
}
