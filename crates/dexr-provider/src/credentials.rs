//! Provider API credentials.

use std::fmt;

/// Minimum length of a plausible API key.
const MIN_KEY_LENGTH: usize = 10;

/// An opaque API secret supplied by the caller for a single request.
///
/// The secret never appears in `Debug` output and is not serializable, so it
/// cannot leak into logs or persisted records by accident.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials(String);

impl Credentials {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Access the raw secret for building an authenticated request.
    pub fn expose(&self) -> &str {
        self.0.trim()
    }

    /// Cheap sanity check: present and at least [`MIN_KEY_LENGTH`] characters.
    pub fn is_plausible(&self) -> bool {
        self.expose().len() >= MIN_KEY_LENGTH
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credentials(***)")
    }
}
