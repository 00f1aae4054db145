//! Input validation for memory writes and queries.
//!
//! Everything here runs before any storage call: a rejected record never
//! reaches the index.

use tether_types::error::ValidationError;
use tether_types::memory::{NewIntervention, Outcome};

pub const MAX_CONTEXT_CHARS: usize = 2000;
pub const MAX_INTERVENTION_CHARS: usize = 1000;

/// Check that an embedding has exactly `dimension` finite components.
pub fn validate_embedding(embedding: &[f32], dimension: usize) -> Result<(), ValidationError> {
    if embedding.len() != dimension {
        return Err(ValidationError::new(
            "embedding",
            format!("expected dimension {dimension}, got {}", embedding.len()),
        ));
    }
    if let Some(pos) = embedding.iter().position(|v| !v.is_finite()) {
        return Err(ValidationError::new(
            "embedding",
            format!("non-finite value at index {pos}"),
        ));
    }
    Ok(())
}

fn validate_text(
    field: &'static str,
    value: &str,
    max_chars: Option<usize>,
) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "cannot be empty"));
    }
    if let Some(max) = max_chars {
        let len = value.chars().count();
        if len > max {
            return Err(ValidationError::new(
                field,
                format!("too long: {len} chars (max {max})"),
            ));
        }
    }
    Ok(())
}

/// Validate every field of an intervention.
///
/// Unknown outcome labels pass validation; the caller logs them.
pub fn validate_intervention(
    input: &NewIntervention,
    dimension: usize,
) -> Result<(), ValidationError> {
    validate_text("context", &input.context, Some(MAX_CONTEXT_CHARS))?;
    validate_text(
        "intervention",
        &input.intervention_text,
        Some(MAX_INTERVENTION_CHARS),
    )?;
    validate_text("task", &input.task, None)?;
    if matches!(&input.outcome, Outcome::Other(label) if label.trim().is_empty()) {
        return Err(ValidationError::new("outcome", "cannot be empty"));
    }
    validate_embedding(&input.embedding, dimension)
}

pub fn validate_insight(insight: &str) -> Result<(), ValidationError> {
    validate_text("insight", insight, None)
}

/// Truncate to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
