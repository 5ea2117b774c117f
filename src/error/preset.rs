// Preset store error types

use std::fmt;

/// Errors from preset persistence and lookup.
///
/// A corrupt preset record aborts only that load; the caller keeps (or falls
/// back to) a consistent state, never a partially applied one.
#[derive(Debug)]
pub enum PresetError {
    /// Reading or writing the preset file failed
    Io { path: String, source: std::io::Error },

    /// A stored preset is missing required fields or has the wrong shape
    Corrupted { id: String, reason: String },

    /// No preset name matches the search term
    NotFound { term: String },

    /// More than one preset name matches the search term
    Ambiguous { term: String, matches: Vec<String> },
}

impl fmt::Display for PresetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PresetError::Io { path, source } => {
                write!(f, "preset file {}: {}", path, source)
            }
            PresetError::Corrupted { id, reason } => {
                write!(f, "preset {} is corrupted: {}", id, reason)
            }
            PresetError::NotFound { term } => {
                write!(f, "no preset matches '{}'", term)
            }
            PresetError::Ambiguous { term, matches } => {
                write!(
                    f,
                    "'{}' matches {} presets: {}",
                    term,
                    matches.len(),
                    matches.join(", ")
                )
            }
        }
    }
}

impl std::error::Error for PresetError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PresetError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = PresetError::NotFound {
            term: "rock".to_string(),
        };
        assert!(err.to_string().contains("rock"));

        let err = PresetError::Ambiguous {
            term: "ba".to_string(),
            matches: vec!["ID1 ballad".to_string(), "ID2 bassline".to_string()],
        };
        assert!(err.to_string().contains("ballad"));

        let err = PresetError::Corrupted {
            id: "3".to_string(),
            reason: "missing field bpm".to_string(),
        };
        assert!(err.to_string().contains("bpm"));
    }
}
