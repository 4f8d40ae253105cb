//! Identifier types shared across the crate.

use uuid::Uuid;

/// Account identifier, shared across every room a user sits in.
pub type UserId = i64;

/// Chat room identifier.
pub type RoomId = i64;

/// Per-room display number shown next to a user in the room UI.
/// Distinct from [`UserId`]; the mapping lives outside this crate.
pub type UserNumber = i64;

/// Generate a unique connection handle for one open transport.
///
/// A user with several tabs in the same room holds several handles.
pub fn generate_handle_id() -> String {
    format!("{}.{}", std::process::id(), Uuid::new_v4().as_simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_are_unique() {
        let a = generate_handle_id();
        let b = generate_handle_id();
        assert_ne!(a, b);
    }

    #[test]
    fn handle_carries_pid_prefix() {
        let handle = generate_handle_id();
        let pid = std::process::id().to_string();
        assert!(handle.starts_with(&format!("{}.", pid)));
    }
}
