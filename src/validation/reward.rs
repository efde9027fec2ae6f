use garde::Validate;
use uuid::Uuid;

use crate::validation::{ValidationError, not_blank};

#[derive(Debug, Validate)]
struct RewardDescription<'a> {
    #[garde(length(min = 1, max = 1000), custom(not_blank))]
    description: &'a str,
}

/// Validates a reward description (non-blank, at most 1000 bytes).
pub fn validate_description(description: &str) -> Result<(), ValidationError> {
    RewardDescription { description }.validate()?;
    Ok(())
}

/// A reward always goes to somebody else.
pub fn validate_parties(giver: Uuid, receiver: Uuid) -> Result<(), ValidationError> {
    if giver == receiver {
        return Err(ValidationError::new("A reward cannot be given to yourself"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn description_limits() {
        assert!(validate_description("Coffee").is_ok());
        assert!(validate_description("\n\t").is_err());
        assert!(validate_description(&"x".repeat(1001)).is_err());
    }

    #[test]
    fn self_reward_is_rejected() {
        let me = Uuid::new_v4();
        assert!(validate_parties(me, me).is_err());
        assert!(validate_parties(me, Uuid::new_v4()).is_ok());
    }
}
