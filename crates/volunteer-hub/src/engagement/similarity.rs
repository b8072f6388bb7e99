/// Query handed to the external scoring collaborator: either the skill
/// set of a volunteer or a free-text search phrase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimilarityQuery {
    Skills(Vec<String>),
    Text(String),
}

/// One scored candidate, score in `[0, 1]`, most relevant first in the
/// collaborator's response.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedCandidate {
    pub id: String,
    pub score: f32,
}

#[derive(Debug, thiserror::Error)]
pub enum SimilarityError {
    #[error("similarity collaborator unavailable: {0}")]
    Unavailable(String),
}

/// External semantic-scoring collaborator. The collaborator maintains its
/// own index, so responses may reference ids the caller no longer holds;
/// the ranking gateway tolerates that.
pub trait SimilarityClient: Send + Sync {
    /// Rank `candidates` against `query`, most relevant first. A supplied
    /// threshold omits candidates scoring below it; without one every
    /// candidate comes back ranked.
    fn rank(
        &self,
        query: &SimilarityQuery,
        candidates: &[String],
        threshold: Option<f32>,
    ) -> Result<Vec<RankedCandidate>, SimilarityError>;
}
