use once_cell::sync::OnceCell;
use std::collections::HashMap;
use thiserror::Error;

pub const INDEX_DOCUMENT: &str = "index.html";

const EMBEDDED: &[(&str, &[u8])] = &[
    ("index.html", include_bytes!("../static/index.html")),
    ("app.js", include_bytes!("../static/app.js")),
    ("style.css", include_bytes!("../static/style.css")),
];

static BUNDLE: OnceCell<AssetBundle> = OnceCell::new();

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("embedded asset {0} is empty")]
    Empty(String),
    #[error("embedded bundle has no index.html")]
    MissingIndex,
}

#[derive(Debug, Clone, Copy)]
pub struct Asset {
    pub content_type: &'static str,
    pub body: &'static [u8],
}

/// Read-only dashboard files compiled into the binary.
#[derive(Debug)]
pub struct AssetBundle {
    files: HashMap<&'static str, Asset>,
}

impl AssetBundle {
    pub fn from_entries(entries: &[(&'static str, &'static [u8])]) -> Result<Self, AssetError> {
        let mut files = HashMap::with_capacity(entries.len());
        for (path, body) in entries {
            if body.is_empty() {
                return Err(AssetError::Empty(path.to_string()));
            }
            files.insert(
                *path,
                Asset {
                    content_type: content_type_for(path),
                    body: *body,
                },
            );
        }
        if !files.contains_key(INDEX_DOCUMENT) {
            return Err(AssetError::MissingIndex);
        }
        Ok(Self { files })
    }

    /// Maps a request path to a file. Directory-style paths get the index
    /// document; traversal segments never match.
    pub fn resolve(&self, uri_path: &str) -> Option<&Asset> {
        let trimmed = uri_path.trim_start_matches('/');
        if trimmed.split('/').any(|seg| seg == ".." || seg == ".") {
            return None;
        }
        if trimmed.is_empty() || trimmed.ends_with('/') {
            let key = format!("{trimmed}{INDEX_DOCUMENT}");
            return self.files.get(key.as_str());
        }
        self.files.get(trimmed)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }
}

/// Builds the process-wide bundle on first use and hands out the same
/// instance afterwards.
pub fn bundle() -> Result<&'static AssetBundle, AssetError> {
    BUNDLE.get_or_try_init(|| AssetBundle::from_entries(EMBEDDED))
}

fn content_type_for(path: &str) -> &'static str {
    match path.rsplit_once('.').map(|(_, ext)| ext) {
        Some("html") => "text/html; charset=utf-8",
        Some("js") => "text/javascript; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("json") => "application/json",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("ico") => "image/x-icon",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_bundle_is_valid() {
        let bundle = bundle().expect("embedded bundle");
        assert_eq!(bundle.len(), EMBEDDED.len());
        assert!(std::ptr::eq(bundle, super::bundle().unwrap()));
    }

    #[test]
    fn root_resolves_to_index() {
        let bundle = bundle().unwrap();
        let index = bundle.resolve("/").expect("index");
        assert_eq!(index.content_type, "text/html; charset=utf-8");
        assert!(std::ptr::eq(
            index.body,
            bundle.resolve("/index.html").unwrap().body
        ));
    }

    #[test]
    fn files_resolve_with_content_type() {
        let bundle = bundle().unwrap();
        assert_eq!(
            bundle.resolve("/app.js").unwrap().content_type,
            "text/javascript; charset=utf-8"
        );
        assert_eq!(
            bundle.resolve("/style.css").unwrap().content_type,
            "text/css; charset=utf-8"
        );
    }

    #[test]
    fn unknown_and_traversal_paths_miss() {
        let bundle = bundle().unwrap();
        assert!(bundle.resolve("/nope.txt").is_none());
        assert!(bundle.resolve("/sub/").is_none());
        assert!(bundle.resolve("/../index.html").is_none());
        assert!(bundle.resolve("/./app.js").is_none());
    }

    #[test]
    fn bundle_without_index_is_rejected() {
        let err = AssetBundle::from_entries(&[("app.js", &b"x"[..])]).unwrap_err();
        assert!(matches!(err, AssetError::MissingIndex));
        let err = AssetBundle::from_entries(&[("index.html", &b""[..])]).unwrap_err();
        assert!(matches!(err, AssetError::Empty(_)));
    }
}
