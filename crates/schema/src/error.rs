use std::path::PathBuf;

/// The declarative schema source could not be read or parsed.
///
/// A load error never replaces the active definition: the registry keeps
/// serving whatever it adopted last.
#[derive(Debug, thiserror::Error)]
pub enum SchemaLoadError {
    /// The source file could not be read.
    #[error("failed to read schema source {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The source is not a well-formed schema document (bad JSON, duplicate
    /// names, malformed array or option forms).
    #[error("malformed schema source {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A field references a type tag outside the known vocabulary.
///
/// Fatal to compiling the named kind only; other kinds in the same
/// definition still compile.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown type '{tag}' for field '{field}' of kind '{kind}'")]
pub struct UnknownTypeError {
    pub kind: String,
    /// Dotted path for fields inside nested structures.
    pub field: String,
    pub tag: String,
}

/// A document was rejected by a compiled shape.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("record does not match shape '{kind}': {}", .violations.join("; "))]
pub struct ShapeError {
    pub kind: String,
    pub violations: Vec<String>,
}
