//! Input validation for account fields.

/// Username length bounds (inclusive).
pub const USERNAME_MIN: usize = 3;
/// Maximum username length in bytes.
pub const USERNAME_MAX: usize = 20;

/// Password length bounds (inclusive).
pub const PASSWORD_MIN: usize = 8;
/// Maximum password length in bytes.
pub const PASSWORD_MAX: usize = 128;

/// Whether a username matches `[A-Za-z0-9_-]{3,20}`.
#[must_use]
pub fn is_valid_username(username: &str) -> bool {
    (USERNAME_MIN..=USERNAME_MAX).contains(&username.len())
        && username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Whether a password is acceptable for registration or rotation.
///
/// 8-128 bytes with at least one lowercase, one uppercase, one digit, and
/// one other character.
#[must_use]
pub fn is_strong_password(password: &str) -> bool {
    if !(PASSWORD_MIN..=PASSWORD_MAX).contains(&password.len()) {
        return false;
    }

    let mut lower = false;
    let mut upper = false;
    let mut digit = false;
    let mut other = false;

    for c in password.chars() {
        match c {
            'a'..='z' => lower = true,
            'A'..='Z' => upper = true,
            '0'..='9' => digit = true,
            _ => other = true,
        }
    }

    lower && upper && digit && other
}
