//! Subject key generation and handling.

/// A key that uniquely identifies a throttled subject.
///
/// The key is composed of the guarded action (which selects the policy)
/// and the subject being throttled, such as a username or device id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubjectKey {
    /// The action being guarded, e.g. `login`
    pub action: String,
    /// The subject attempting the action
    pub subject: String,
}

impl SubjectKey {
    /// Create a new subject key.
    pub fn new(action: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            subject: subject.into(),
        }
    }
}

impl std::fmt::Display for SubjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.action, self.subject)
    }
}
