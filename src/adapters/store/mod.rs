//! Catalog Store Adapters
//!
//! Implements the `CatalogStore` port for:
//! - `firebase`: Firebase Realtime Database over its REST interface
//! - `file`: A local JSON document laid out like a database export

pub mod file;
pub mod firebase;

use serde_json::Value;

pub use file::FileStore;
pub use firebase::FirebaseStore;

/// Extract a bearer token from a token document.
///
/// Accepts a bare JSON string or an object with `access_token`.
pub(crate) fn token_from_value(value: &Value) -> Option<String> {
    let token = match value {
        Value::String(s) => s.as_str(),
        Value::Object(fields) => fields.get("access_token")?.as_str()?,
        _ => return None,
    };
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// Split a slash-separated store path into its non-empty segments.
pub(crate) fn path_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}
