use serde::{Deserialize, Serialize};

/// `TryParse` allows a subfield to fail parsing without failing the parsing of the whole
/// structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TryParse<T> {
    /// The value parsed as `T`.
    Parsed(T),
    /// The raw value that could not be parsed as `T`.
    ParseFailed(serde_json::Value),
}

impl<T> From<TryParse<T>> for Option<T> {
    fn from(value: TryParse<T>) -> Self {
        match value {
            TryParse::Parsed(v) => Some(v),
            TryParse::ParseFailed(_) => None,
        }
    }
}

/// Flatten an optional, possibly malformed field into an `Option`.
pub(crate) fn parsed<T>(field: Option<TryParse<T>>) -> Option<T> {
    field.and_then(Option::from)
}
