/// Why a generation attempt produced no record.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("no LLM provider configured")]
    NoProvider,

    #[error("generator call failed: {0}")]
    Generator(String),

    #[error("generator returned an empty response")]
    EmptyResponse,

    #[error("prompt template error: {0}")]
    Template(#[from] TemplateError),
}

/// Rendering failures; these are configuration errors in `prompt_template`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("unknown placeholder {{{0}}}")]
    UnknownPlaceholder(String),

    #[error("unclosed '{{' at byte {0}")]
    UnclosedBrace(usize),

    #[error("single '}}' at byte {0}")]
    StrayBrace(usize),
}
