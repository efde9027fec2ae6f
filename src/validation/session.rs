use chrono::{DateTime, Utc};
use garde::Validate;

use crate::{
    models::session::SoloListing,
    validation::{ValidationError, not_blank},
};

#[derive(Debug, Validate)]
struct SessionFields<'a> {
    #[garde(length(min = 1, max = 200), custom(not_blank))]
    title: &'a str,
    #[garde(length(max = 300))]
    location: Option<&'a str>,
}

/// Validates the editable fields of a new session.
///
/// # Arguments
///
/// * `title` - Session title.
/// * `start_time` / `end_time` - The scheduled window; must not be empty.
/// * `location` - Optional meeting place for offline sessions.
pub fn validate_session(
    title: &str,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    location: Option<&str>,
) -> Result<(), ValidationError> {
    SessionFields { title, location }.validate()?;

    if end_time <= start_time {
        return Err(ValidationError::new("Session must end after it starts"));
    }

    Ok(())
}

#[derive(Debug, Validate)]
struct ListingFields<'a> {
    #[garde(length(max = 2000))]
    description: &'a str,
    #[garde(length(max = 20), inner(length(min = 1, max = 50)))]
    tech_stack: &'a [String],
    #[garde(length(max = 50))]
    level: &'a str,
}

/// Validates the listing details of a solo session.
pub fn validate_listing(listing: &SoloListing) -> Result<(), ValidationError> {
    ListingFields {
        description: &listing.description,
        tech_stack: &listing.tech_stack,
        level: &listing.partner_preferences.level,
    }
    .validate()?;

    if listing.tech_stack.iter().any(|tech| tech.trim().is_empty()) {
        return Err(ValidationError::new("Tech stack entries must not be blank"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn window_must_not_be_empty() {
        let start = Utc::now();
        assert!(validate_session("Focus", start, start + Duration::hours(2), None).is_ok());
        assert!(validate_session("Focus", start, start, None).is_err());
        assert!(validate_session("Focus", start, start - Duration::minutes(5), None).is_err());
    }

    #[test]
    fn title_and_location_limits() {
        let start = Utc::now();
        let end = start + Duration::hours(1);
        assert!(validate_session(" ", start, end, None).is_err());
        assert!(validate_session("Cafe day", start, end, Some("Blue Bottle")).is_ok());
        assert!(validate_session("Cafe day", start, end, Some(&"x".repeat(301))).is_err());
    }

    #[test]
    fn listing_limits() {
        let listing = SoloListing {
            description: "Pairing on a parser".to_string(),
            tech_stack: vec!["rust".to_string(), "postgres".to_string()],
            ..SoloListing::default()
        };
        assert!(validate_listing(&listing).is_ok());

        let blank_tech = SoloListing {
            tech_stack: vec!["  ".to_string()],
            ..listing.clone()
        };
        assert!(validate_listing(&blank_tech).is_err());

        let crowded = SoloListing {
            tech_stack: (0..21).map(|i| format!("lang{i}")).collect(),
            ..listing.clone()
        };
        assert!(validate_listing(&crowded).is_err());

        let rambling = SoloListing {
            description: "x".repeat(2001),
            ..listing
        };
        assert!(validate_listing(&rambling).is_err());
    }
}
