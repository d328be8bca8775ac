//! Build-time error taxonomy.
//!
//! Structural failures abort the build with no partial output; unresolved
//! dependency targets are warnings carried on the resolution result instead.

/// Fatal build errors.
#[derive(Debug, Clone)]
pub enum BuildError {
    /// The transform could not produce valid output for a file.
    Translation { file: String, message: String },
    /// Read/write failure against the project file system.
    Io { path: String, message: String },
    /// The page template is missing or not usable as HTML.
    Page { message: String },
}

impl std::fmt::Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Translation { file, message } => {
                write!(f, "translation error in '{}': {}", file, message)
            }
            Self::Io { path, message } => write!(f, "io error on '{}': {}", path, message),
            Self::Page { message } => write!(f, "page template error: {}", message),
        }
    }
}

impl std::error::Error for BuildError {}

impl BuildError {
    pub fn io(path: &std::path::Path, err: std::io::Error) -> Self {
        Self::Io {
            path: path.to_string_lossy().to_string(),
            message: err.to_string(),
        }
    }

    pub fn translation(file: &str, message: impl Into<String>) -> Self {
        Self::Translation {
            file: file.to_string(),
            message: message.into(),
        }
    }

    pub fn page(message: impl Into<String>) -> Self {
        Self::Page {
            message: message.into(),
        }
    }
}
