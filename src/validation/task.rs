use garde::Validate;

use crate::models::task::TaskPatch;
use crate::validation::{ValidationError, not_blank};

#[derive(Debug, Validate)]
struct TaskTitle<'a> {
    #[garde(length(min = 1, max = 500), custom(not_blank))]
    title: &'a str,
}

/// Validates a task title.
///
/// # Arguments
///
/// * `title` - The title as typed by the user.
///
/// # Returns
///
/// `Ok(())` when the title is non-blank and at most 500 bytes.
pub fn validate_title(title: &str) -> Result<(), ValidationError> {
    TaskTitle { title }.validate()?;
    Ok(())
}

/// Validates a partial task update. An empty patch is rejected.
pub fn validate_patch(patch: &TaskPatch) -> Result<(), ValidationError> {
    if patch.is_empty() {
        return Err(ValidationError::new("Task update must change at least one field"));
    }
    if let Some(title) = &patch.title {
        validate_title(title)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_and_oversized_titles_are_rejected() {
        assert!(validate_title("Write tests").is_ok());
        assert!(validate_title("").is_err());
        assert!(validate_title("   ").is_err());
        assert!(validate_title(&"x".repeat(501)).is_err());
    }

    #[test]
    fn empty_patch_is_rejected() {
        assert!(validate_patch(&TaskPatch::default()).is_err());
        assert!(validate_patch(&TaskPatch { is_done: Some(true), ..TaskPatch::default() }).is_ok());
        assert!(validate_patch(&TaskPatch { title: Some(" ".into()), ..TaskPatch::default() }).is_err());
    }
}
