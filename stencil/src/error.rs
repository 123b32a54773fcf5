//! Crate error type
//!
//! Each layer has its own error enum; [`Error`] wraps them all so callers
//! that drive the whole pipeline can use a single `?`.

use crate::escape::AnalysisError;
use crate::exec::ExecError;
use crate::lexing::LexError;
use crate::parsing::ParseError;
use crate::set::RegistryError;
use crate::transforms::TransformError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Exec(#[from] ExecError),

    /// A custom pipeline stage failed
    #[error(transparent)]
    Transform(TransformError),
}

impl From<TransformError> for Error {
    fn from(err: TransformError) -> Self {
        match err {
            TransformError::Lex(err) => Error::Lex(err),
            TransformError::Parse(err) => Error::Parse(err),
            other @ TransformError::StageFailed { .. } => Error::Transform(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transforms::stages::Source;
    use crate::transforms::standard::STANDARD_PARSE;

    #[test]
    fn test_pipeline_errors_keep_their_layer() {
        let err = Error::from(STANDARD_PARSE.run(Source::new("t", "{{.")).unwrap_err());
        assert!(matches!(err, Error::Lex(_)));
        let err = Error::from(STANDARD_PARSE.run(Source::new("t", "{{end}}")).unwrap_err());
        assert!(matches!(err, Error::Parse(_)));
        let err = Error::from(TransformError::StageFailed {
            stage: "minify".to_string(),
            message: "bad input".to_string(),
        });
        assert_eq!(err.to_string(), "stage 'minify' failed: bad input");
    }
}
