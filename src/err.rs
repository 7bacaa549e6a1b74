//! Error taxonomy of the lookup engine.

/// Errors surfaced by the lookup engine.
///
/// Per-token and per-variant failures are recovered by the engine and
/// end up in classification buckets; everything else aborts the request.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// Malformed variant or rsID token.
    #[error("{0}")]
    Parse(String),
    #[error("variant {0} not found")]
    VariantNotFound(String),
    #[error("Gene {0} not found")]
    GeneNotFound(String),
    #[error("No variants found for gene {0}")]
    NoVariantsInRange(String),
    /// Variant exists but carries the AC0 filter in all available sources.
    #[error("AC0 for {0}")]
    AcZero(String),
    /// I/O problem or invariant violation in an underlying store.
    #[error("{0}")]
    Data(String),
    /// Request exceeds configured limits or cannot be interpreted.
    #[error("{0}")]
    Validation(String),
}

impl LookupError {
    /// HTTP-equivalent status code of the error.
    pub fn status(&self) -> u16 {
        match self {
            LookupError::Parse(_) | LookupError::Validation(_) => 400,
            LookupError::VariantNotFound(_)
            | LookupError::GeneNotFound(_)
            | LookupError::NoVariantsInRange(_)
            | LookupError::AcZero(_) => 404,
            LookupError::Data(_) => 500,
        }
    }

    /// Short tag for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            LookupError::Parse(_) => "parse",
            LookupError::VariantNotFound(_) => "variant_not_found",
            LookupError::GeneNotFound(_) => "gene_not_found",
            LookupError::NoVariantsInRange(_) => "no_variants_in_range",
            LookupError::AcZero(_) => "ac0",
            LookupError::Data(_) => "data",
            LookupError::Validation(_) => "validation",
        }
    }
}
