use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("no such template {name:?}")]
    UndefinedTemplate { name: String },

    #[error("delimiters can't change once a template has been parsed")]
    DelimitersLocked,

    #[error("delimiters must not be empty")]
    EmptyDelimiter,
}
