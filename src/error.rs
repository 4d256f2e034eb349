use std::path::{Path, PathBuf};

use thiserror::Error;

/// Where a problem was found: a logical path (`nodes.login.data`), the file it
/// came from, and optional position/pointer details.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowErrorLocation {
    pub path: Option<String>,
    pub source_path: Option<PathBuf>,
    pub line: Option<usize>,
    pub col: Option<usize>,
    pub json_pointer: Option<String>,
}

impl FlowErrorLocation {
    pub fn new(path: Option<String>, line: Option<usize>, col: Option<usize>) -> Self {
        FlowErrorLocation {
            path,
            source_path: None,
            line,
            col,
            json_pointer: None,
        }
    }

    pub fn at_path(path: impl Into<String>) -> Self {
        FlowErrorLocation::new(Some(path.into()), None, None)
    }

    pub fn at_path_with_position(
        path: impl Into<String>,
        line: Option<usize>,
        col: Option<usize>,
    ) -> Self {
        FlowErrorLocation::new(Some(path.into()), line, col)
    }

    pub fn with_source_path(mut self, source_path: Option<&Path>) -> Self {
        self.source_path = source_path.map(Path::to_path_buf);
        self
    }

    pub fn with_json_pointer(mut self, pointer: Option<String>) -> Self {
        self.json_pointer = pointer;
        self
    }

    /// Human readable `file:line:col` style description, if anything is known.
    pub fn describe(&self) -> Option<String> {
        let base = self
            .source_path
            .as_ref()
            .map(|p| p.display().to_string())
            .or_else(|| self.path.clone())?;
        let mut out = base;
        if let Some(line) = self.line {
            out.push_str(&format!(":{line}"));
            if let Some(col) = self.col {
                out.push_str(&format!(":{col}"));
            }
        }
        if let Some(pointer) = &self.json_pointer
            && !out.ends_with(pointer.as_str())
        {
            out.push_str(&format!(" ({pointer})"));
        }
        Some(out)
    }
}

impl std::fmt::Display for FlowErrorLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.describe() {
            Some(desc) => f.write_str(&desc),
            None => f.write_str("<unknown>"),
        }
    }
}

/// One schema violation inside a document.
#[derive(Debug, Clone)]
pub struct SchemaErrorDetail {
    pub message: String,
    pub location: FlowErrorLocation,
}

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("JSON parse error at {location}: {message}")]
    Json {
        message: String,
        location: FlowErrorLocation,
    },
    #[error("Schema validation failed:\n{message}")]
    Schema {
        message: String,
        details: Vec<SchemaErrorDetail>,
        location: FlowErrorLocation,
    },
    #[error("Invalid configuration at {location}: {message}")]
    Config {
        message: String,
        location: FlowErrorLocation,
    },
    #[error("I/O error at {location}: {message}")]
    Io {
        message: String,
        location: FlowErrorLocation,
    },
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        location: FlowErrorLocation,
    },
}

impl FlowError {
    pub fn location(&self) -> &FlowErrorLocation {
        match self {
            FlowError::Json { location, .. }
            | FlowError::Schema { location, .. }
            | FlowError::Config { location, .. }
            | FlowError::Io { location, .. }
            | FlowError::Internal { location, .. } => location,
        }
    }
}

pub type Result<T> = std::result::Result<T, FlowError>;
