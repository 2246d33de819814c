//! Validation helpers for DTOs.

use std::collections::HashSet;

use validator::ValidationError;

use crate::{
    dto::session::PlayerInput,
    state::game::{MAX_JERSEY_NUMBER, MAX_ROSTER_SIZE},
};

/// Validates a `#rrggbb` color.
///
/// ```ignore
/// validate_color("#1d4ed8") // Ok
/// validate_color("1d4ed8")  // Err - missing '#'
/// validate_color("#1d4ed")  // Err - too short
/// ```
pub fn validate_color(color: &str) -> Result<(), ValidationError> {
    let Some(hex) = color.strip_prefix('#') else {
        let mut err = ValidationError::new("color_prefix");
        err.message = Some("Color must start with '#'".into());
        return Err(err);
    };

    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        let mut err = ValidationError::new("color_format");
        err.message = Some(format!("Color must be #rrggbb (got {color})").into());
        return Err(err);
    }

    Ok(())
}

/// Validates roster size, jersey range and jersey uniqueness.
pub fn validate_roster(roster: &[PlayerInput]) -> Result<(), ValidationError> {
    if roster.len() > MAX_ROSTER_SIZE {
        let mut err = ValidationError::new("roster_size");
        err.message = Some(
            format!(
                "A roster holds at most {MAX_ROSTER_SIZE} players (got {})",
                roster.len()
            )
            .into(),
        );
        return Err(err);
    }

    let mut seen = HashSet::new();
    for player in roster {
        if player.number > MAX_JERSEY_NUMBER {
            let mut err = ValidationError::new("jersey_range");
            err.message = Some(
                format!(
                    "Jersey numbers range from 0 to {MAX_JERSEY_NUMBER} (got {})",
                    player.number
                )
                .into(),
            );
            return Err(err);
        }
        if !seen.insert(player.number) {
            let mut err = ValidationError::new("jersey_duplicate");
            err.message = Some(format!("Jersey {} is used twice", player.number).into());
            return Err(err);
        }
        if player.name.trim().is_empty() {
            let mut err = ValidationError::new("player_name");
            err.message = Some(format!("Player {} has no name", player.number).into());
            return Err(err);
        }
    }

    Ok(())
}
