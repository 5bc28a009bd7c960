//! Validation helpers for DTOs.

use validator::ValidationError;

use crate::state::players::PlayerId;

/// Longest role name the chat platform accepts.
pub const MAX_ROLE_NAME_LEN: usize = 100;

/// Rejects the zero id, which no platform user can have.
pub fn validate_player_id(id: &PlayerId) -> Result<(), ValidationError> {
    if id.0 == 0 {
        let mut err = ValidationError::new("player_id_zero");
        err.message = Some("Player ID must be a non-zero snowflake".into());
        return Err(err);
    }
    Ok(())
}

/// Validates that a role name is non-blank and fits the platform limit once trimmed.
///
/// # Examples
///
/// ```ignore
/// validate_role_name("i play mafia") // Ok
/// validate_role_name("   ")          // Err - blank
/// ```
pub fn validate_role_name(name: &str) -> Result<(), ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        let mut err = ValidationError::new("role_name_blank");
        err.message = Some("Role name must not be blank".into());
        return Err(err);
    }

    let len = trimmed.chars().count();
    if len > MAX_ROLE_NAME_LEN {
        let mut err = ValidationError::new("role_name_length");
        err.message = Some(
            format!("Role name must be at most {MAX_ROLE_NAME_LEN} characters (got {len})").into(),
        );
        return Err(err);
    }

    Ok(())
}
