//! Errors raised while loading layouts and driving the engine.
//!
//! Design-rule violations are values reported through
//! [`DrcOutcome`](crate::drc::DrcOutcome), never errors.

use std::fmt::Display;
use std::path::PathBuf;

use arcstr::ArcStr;
use thiserror::Error;

use crate::tech::LayerNum;

pub type Result<T> = std::result::Result<T, PermuteError>;

/// An [`ErrorSource`] and the operations that were underway, innermost first.
#[derive(Debug)]
pub struct PermuteError {
    source: ErrorSource,
    context: Vec<ErrorContext>,
}

impl PermuteError {
    pub fn new(source: impl Into<ErrorSource>) -> Self {
        Self {
            source: source.into(),
            context: Vec::new(),
        }
    }

    #[inline]
    pub fn source(&self) -> &ErrorSource {
        &self.source
    }

    #[inline]
    pub fn context(&self) -> &[ErrorContext] {
        &self.context
    }
}

impl std::error::Error for PermuteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

impl Display for PermuteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.source)?;
        for ctx in self.context.iter() {
            write!(f, "\n  while {ctx}")?;
        }
        Ok(())
    }
}

impl<T> From<T> for PermuteError
where
    T: Into<ErrorSource>,
{
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

/// Records what was being done when `result` failed.
#[inline]
pub fn with_err_context<T, E, C>(result: std::result::Result<T, E>, ctx: C) -> Result<T>
where
    C: FnOnce() -> ErrorContext,
    E: Into<PermuteError>,
{
    result.map_err(|err| {
        let mut err = err.into();
        err.context.push(ctx());
        err
    })
}

#[derive(Debug, Clone, Eq, PartialEq)]
#[non_exhaustive]
pub enum ErrorContext {
    ReadFile(PathBuf),
    CreateFile(PathBuf),
    CreateDir(PathBuf),
    LoadLayerMap(PathBuf),
    BuildLayout(ArcStr),
    Task(ArcStr),
}

impl Display for ErrorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReadFile(path) => write!(f, "reading {path:?}"),
            Self::CreateFile(path) => write!(f, "writing {path:?}"),
            Self::CreateDir(path) => write!(f, "creating directory {path:?}"),
            Self::LoadLayerMap(path) => write!(f, "loading layer map {path:?}"),
            Self::BuildLayout(name) => write!(f, "building geometry model for {name}"),
            Self::Task(task) => write!(f, "{task}"),
        }
    }
}

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ErrorSource {
    #[error("malformed geometry on layer {layer}: {reason} ({points} points)")]
    MalformedGeometry {
        layer: LayerNum,
        points: usize,
        reason: cellgeom::QuadError,
    },

    #[error("no such layer in layer map: {0}")]
    LayerNotFound(LayerNum),

    #[error("no layer map found for {0:?}")]
    LayerMapNotFound(PathBuf),

    #[error("invalid layer map: {0}")]
    InvalidLayerMap(String),

    #[error("{0} has labels that land on no polygon")]
    FloatingLabels(ArcStr),

    #[error("GDS library contains no structures")]
    NoStructures,

    #[error("LVS client error: {0}")]
    Lvs(String),

    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("error parsing JSON: {0}")]
    JsonParsing(#[from] serde_json::Error),

    #[error("error parsing TOML: {0}")]
    TomlParsing(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_is_rendered_innermost_first() {
        let inner: Result<()> = Err(ErrorSource::LayerNotFound(17).into());
        let built = with_err_context(inner, || {
            ErrorContext::BuildLayout(ArcStr::from("INVx1"))
        });
        let err = with_err_context(built, || ErrorContext::Task(ArcStr::from("permuting INVx1")))
            .unwrap_err();

        let msg = format!("{err}");
        assert!(msg.starts_with("no such layer in layer map: 17"));
        let build = msg.find("building geometry model for INVx1").unwrap();
        let task = msg.find("permuting INVx1").unwrap();
        assert!(build < task);
        assert!(matches!(err.source(), ErrorSource::LayerNotFound(17)));
    }

    #[test]
    fn io_errors_convert_with_context() {
        let res: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "missing",
        ));
        let err = with_err_context(res, || ErrorContext::ReadFile(PathBuf::from("a.json")))
            .unwrap_err();
        assert!(matches!(err.source(), ErrorSource::Io(_)));
        assert_eq!(
            err.context(),
            &[ErrorContext::ReadFile(PathBuf::from("a.json"))]
        );
    }
}
