use async_trait::async_trait;
use paper_vector_store::VectorId;
use serde::{Deserialize, Serialize};

/// Error type returned by external collaborators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A retrieved passage with its similarity to the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPassage {
    pub vector_id: VectorId,
    pub document_id: String,
    pub text: String,
    pub score: f32,
}

/// Generates an answer from the passages retrieved for a query.
#[async_trait]
pub trait AnswerService: Send + Sync {
    async fn answer(
        &self,
        query: &str,
        passages: &[ScoredPassage],
    ) -> std::result::Result<String, BoxError>;
}

/// Extracts ranked keywords from document text.
#[async_trait]
pub trait KeywordExtractor: Send + Sync {
    async fn extract_keywords(&self, text: &str) -> std::result::Result<Vec<String>, BoxError>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub query: String,
    pub answer: String,
    pub sections: Vec<ScoredPassage>,
}

/// Answers with the rendered context sections themselves.
///
/// Used when no generator is wired in, e.g. by the command-line driver.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextSections;

#[async_trait]
impl AnswerService for ContextSections {
    async fn answer(
        &self,
        _query: &str,
        passages: &[ScoredPassage],
    ) -> std::result::Result<String, BoxError> {
        Ok(render_sections(passages))
    }
}

/// Format passages as `### Section (Score: s):` blocks separated by blank lines.
#[must_use]
pub fn render_sections(passages: &[ScoredPassage]) -> String {
    passages
        .iter()
        .map(|p| format!("### Section (Score: {:.4}):\n{}", p.score, p.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}
