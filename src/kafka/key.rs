use uuid::Uuid;

/// Returns the caller's key, or a fresh random one when none was given.
///
/// The key only steers partition assignment on the broker side; it is never
/// used to deduplicate messages.
pub fn resolve_key(key: Option<&str>) -> String {
    match key {
        Some(key) => key.to_string(),
        None => generate_key(),
    }
}

/// A new random (v4) UUID in its hyphenated form.
pub fn generate_key() -> String {
    Uuid::new_v4().to_string()
}
