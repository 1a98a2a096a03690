use thiserror::Error;
use url::Url;

use crate::types::DesignReference;

#[derive(Debug, Error)]
pub enum ReferenceParseError {
    #[error("Figma URL missing file key in '{url}'. Hint: use https://www.figma.com/design/<FILE_KEY>/... or /file/<FILE_KEY>/...")]
    MissingFileKey { url: String },
    #[error("Figma URL missing node-id in '{url}'. Hint: select a frame and copy its link so the URL carries ?node-id=...")]
    MissingNodeId { url: String },
    #[error("Invalid preview URL '{value}': {message}. Hint: include http(s):// and ensure the URL is well-formed.")]
    InvalidTarget { value: String, message: String },
}

/// Path segments that precede the file key in Figma links.
const FILE_KEY_MARKERS: &[&str] = &["design", "file"];

/// Parses a Figma link into a [`DesignReference`], requiring a node id.
///
/// Exports are per-node, so a link that only names the file is rejected here
/// rather than failing later at the export step.
pub fn parse_design_reference(value: &str) -> Result<DesignReference, ReferenceParseError> {
    let reference = parse_design_url(value)?;
    if reference.node_id.is_none() {
        return Err(ReferenceParseError::MissingNodeId {
            url: value.to_string(),
        });
    }
    Ok(reference)
}

/// Extracts the file key and optional node id from a Figma link.
///
/// Matching is permissive: any host is accepted and strings that are not
/// valid URLs are scanned for the same `/design/<key>` or `/file/<key>`
/// shapes. Node ids are translated from the URL form (`12-34`) to the export
/// API form (`12:34`).
pub fn parse_design_url(value: &str) -> Result<DesignReference, ReferenceParseError> {
    let trimmed = value.trim();
    let (segments, node_param) = match Url::parse(trimmed) {
        Ok(url) => {
            let segments: Vec<String> = url
                .path_segments()
                .map(|s| s.map(str::to_string).collect())
                .unwrap_or_default();
            let node = url
                .query_pairs()
                .find(|(k, _)| k == "node-id")
                .map(|(_, v)| v.into_owned());
            (segments, node)
        }
        Err(_) => scan_raw_reference(trimmed),
    };

    let file_key = FILE_KEY_MARKERS
        .iter()
        .find_map(|marker| {
            segments
                .iter()
                .position(|s| s == marker)
                .and_then(|i| segments.get(i + 1))
        })
        .filter(|key| !key.is_empty())
        .cloned()
        .ok_or_else(|| ReferenceParseError::MissingFileKey {
            url: value.to_string(),
        })?;

    let node_id = node_param
        .map(|raw| raw.trim().replace('-', ":"))
        .filter(|id| !id.is_empty());

    Ok(DesignReference { file_key, node_id })
}

fn scan_raw_reference(value: &str) -> (Vec<String>, Option<String>) {
    let (path, query) = value.split_once('?').unwrap_or((value, ""));
    let segments = path.split('/').map(str::to_string).collect();
    let node = query
        .split('&')
        .find_map(|pair| pair.strip_prefix("node-id="))
        .map(str::to_string);
    (segments, node)
}

/// Validates an implementation URL before any browser is launched.
pub fn parse_target_url(value: &str) -> Result<Url, ReferenceParseError> {
    let url = Url::parse(value.trim()).map_err(|e| ReferenceParseError::InvalidTarget {
        value: value.to_string(),
        message: e.to_string(),
    })?;

    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url),
        "http" | "https" => Err(ReferenceParseError::InvalidTarget {
            value: value.to_string(),
            message: "missing host".to_string(),
        }),
        other => Err(ReferenceParseError::InvalidTarget {
            value: value.to_string(),
            message: format!("unsupported scheme '{other}'"),
        }),
    }
}
