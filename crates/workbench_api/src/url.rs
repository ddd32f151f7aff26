use url::Url;

use crate::error::WorkbenchApiError;

/// Default base URL for workbench REST requests.
pub const DEFAULT_WORKBENCH_BASE_URL: &str = "http://127.0.0.1:8000/api";

/// Normalize a configured base URL.
///
/// Normalization rules:
/// 1) blank input falls back to [`DEFAULT_WORKBENCH_BASE_URL`]
/// 2) surrounding whitespace and trailing slashes are removed
pub fn normalize_base_url(input: &str) -> String {
    let base = if input.trim().is_empty() {
        DEFAULT_WORKBENCH_BASE_URL
    } else {
        input.trim()
    };

    base.trim_end_matches('/').to_string()
}

/// Joins path segments onto the normalized base URL, percent-encoding each
/// segment so project names and ids cannot escape their position.
pub fn endpoint(base_url: &str, segments: &[&str]) -> Result<Url, WorkbenchApiError> {
    let normalized = normalize_base_url(base_url);
    let mut url = Url::parse(&normalized)
        .map_err(|error| WorkbenchApiError::InvalidBaseUrl(format!("{normalized}: {error}")))?;

    {
        let mut path = url.path_segments_mut().map_err(|_| {
            WorkbenchApiError::InvalidBaseUrl(format!("{normalized}: cannot be a base"))
        })?;
        path.pop_if_empty();
        for segment in segments {
            path.push(segment);
        }
    }

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::{endpoint, normalize_base_url, DEFAULT_WORKBENCH_BASE_URL};

    #[test]
    fn normalize_strips_trailing_slashes() {
        assert_eq!(
            normalize_base_url(" http://host:9000/api// "),
            "http://host:9000/api"
        );
    }

    #[test]
    fn normalize_falls_back_to_default() {
        assert_eq!(normalize_base_url("  "), DEFAULT_WORKBENCH_BASE_URL);
    }

    #[test]
    fn endpoint_encodes_segments() {
        let url = endpoint("http://host/api/", &["projects", "sales q1", "metadata"])
            .expect("endpoint builds");
        assert_eq!(url.as_str(), "http://host/api/projects/sales%20q1/metadata");
    }

    #[test]
    fn endpoint_rejects_unparseable_base() {
        assert!(endpoint("not a url", &["sessions"]).is_err());
    }
}
