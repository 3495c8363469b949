//! Ordered, cyclic credential set.

use armory_api_models::Credential;

use crate::ApiError;

/// Holds an ordered set of credentials with exactly one active at a time.
///
/// Rotation advances in fixed order and wraps from the last credential to
/// the first. The rotator itself is not synchronized; callers share it
/// through [`crate::coordinator::QuotaCoordinator`], which serializes
/// rotation.
#[derive(Debug, Clone)]
pub struct CredentialRotator {
    credentials: Vec<Credential>,
    active: usize,
}

impl CredentialRotator {
    /// Creates a rotator with the first credential active.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::NoCredentials`] if `credentials` is empty.
    pub fn new(credentials: Vec<Credential>) -> Result<Self, ApiError> {
        if credentials.is_empty() {
            return Err(ApiError::NoCredentials);
        }
        Ok(Self {
            credentials,
            active: 0,
        })
    }

    /// The active credential.
    #[must_use]
    pub fn current(&self) -> &Credential {
        &self.credentials[self.active]
    }

    /// Advances to the next credential, wrapping to the first after the
    /// last, and returns the new active credential.
    pub fn rotate(&mut self) -> &Credential {
        self.active = (self.active + 1) % self.credentials.len();
        &self.credentials[self.active]
    }

    /// Index of the active credential.
    #[must_use]
    pub const fn active_index(&self) -> usize {
        self.active
    }

    /// Number of credentials in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    /// Always `false`; an empty rotator cannot be constructed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }
}
