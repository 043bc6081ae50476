use serde::{Deserialize, Serialize};

/// Stable handle of an indexed vector; equal to its insertion position.
pub type VectorId = u64;

/// A retrievable span of one document's text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passage {
    pub document_id: String,
    pub text: String,
}

impl Passage {
    #[must_use]
    pub fn new(document_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            text: text.into(),
        }
    }
}
