//! Transform pipeline
//!
//!     Source-to-tree processing is assembled from small stages that can be
//!     chained whenever one stage's output type is the next one's input.
//!
//! Runnable
//!
//!     Every stage implements [`Runnable<I, O>`]:
//!
//!         pub trait Runnable<I, O> {
//!             fn run(&self, input: I) -> Result<O, TransformError>;
//!         }
//!
//! Transform
//!
//!     [`Transform<I, O>`] wraps a runnable and adds `then`, so pipelines read
//!     in the order they run and the compiler checks that adjacent stages fit:
//!
//!         let pipeline = Transform::from_fn(Ok)
//!             .then(Scanning::new(delimiters))   // Source -> Scanned
//!             .then(Parsing::new(funcs));        // Scanned -> Parsed
//!
//! Standard Pipelines
//!
//!     [`standard::parse_pipeline`] is what `TemplateSet::parse` runs, built
//!     from the set's delimiters and the caller's functions. The default
//!     configuration is prebuilt as a `once_cell` static in [`standard`].

pub mod stages;
pub mod standard;

use crate::lexing::LexError;
use crate::parsing::ParseError;
use thiserror::Error;

/// Error raised by a stage
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransformError {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("stage '{stage}' failed: {message}")]
    StageFailed { stage: String, message: String },
}

/// Anything that can turn an `I` into an `O`
pub trait Runnable<I, O> {
    fn run(&self, input: I) -> Result<O, TransformError>;
}

/// A chain of stages from `I` to `O`
pub struct Transform<I, O> {
    run_fn: Box<dyn Fn(I) -> Result<O, TransformError> + Send + Sync>,
}

impl<I, O> Transform<I, O> {
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(I) -> Result<O, TransformError> + Send + Sync + 'static,
    {
        Transform {
            run_fn: Box::new(f),
        }
    }

    /// Append a stage, feeding it this transform's output.
    pub fn then<O2, S>(self, stage: S) -> Transform<I, O2>
    where
        S: Runnable<O, O2> + Send + Sync + 'static,
        I: 'static,
        O: 'static,
        O2: 'static,
    {
        let prev_run = self.run_fn;
        Transform {
            run_fn: Box::new(move |input| stage.run(prev_run(input)?)),
        }
    }

    pub fn run(&self, input: I) -> Result<O, TransformError> {
        (self.run_fn)(input)
    }
}

impl<I: 'static, O: 'static> Runnable<I, O> for Transform<I, O> {
    fn run(&self, input: I) -> Result<O, TransformError> {
        Transform::run(self, input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Double;
    impl Runnable<i32, i32> for Double {
        fn run(&self, input: i32) -> Result<i32, TransformError> {
            Ok(input * 2)
        }
    }

    struct Describe;
    impl Runnable<i32, String> for Describe {
        fn run(&self, input: i32) -> Result<String, TransformError> {
            Ok(format!("n={}", input))
        }
    }

    struct Fail;
    impl Runnable<i32, i32> for Fail {
        fn run(&self, _input: i32) -> Result<i32, TransformError> {
            Err(TransformError::StageFailed {
                stage: "fail".to_string(),
                message: "always".to_string(),
            })
        }
    }

    #[test]
    fn test_stages_run_in_order() {
        let transform = Transform::from_fn(|x: i32| Ok(x + 1))
            .then(Double)
            .then(Describe);
        assert_eq!(transform.run(4).unwrap(), "n=10");
    }

    #[test]
    fn test_error_stops_pipeline() {
        let transform = Transform::from_fn(Ok).then(Fail).then(Double);
        assert_eq!(
            transform.run(1).unwrap_err().to_string(),
            "stage 'fail' failed: always"
        );
    }
}
