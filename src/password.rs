//! Password handling for encrypted containers.

use zeroize::Zeroizing;

/// A password forwarded to container engines that encrypt or decrypt.
///
/// The text is stored in zeroizing memory and wiped on drop. The update
/// coordinator never interprets the password itself; it only hands it to
/// the engine's callback during a rewrite.
///
/// # Missing passwords
///
/// Supplying no password for an encrypted container is not rejected
/// eagerly. Engines that need one either fail mid-rewrite or, for some
/// container formats, appear to complete while producing unusable output.
/// See [`ArchiveUpdater::password`](crate::ArchiveUpdater::password).
#[derive(Clone)]
pub struct Password {
    inner: Zeroizing<String>,
}

impl Password {
    /// Creates a new password from a string.
    pub fn new<S: Into<String>>(password: S) -> Self {
        Self {
            inner: Zeroizing::new(password.into()),
        }
    }

    /// Returns the password as a string slice.
    pub fn as_str(&self) -> &str {
        &self.inner
    }

    /// Returns the password bytes.
    pub fn as_bytes(&self) -> &[u8] {
        self.inner.as_bytes()
    }

    /// Returns true if the password is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never leak the text through Debug output or logs.
        f.debug_struct("Password").finish_non_exhaustive()
    }
}

impl From<&str> for Password {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Password {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}
