use url::Url;

use crate::error::ConnectionError;

/// Live-channel address for `session_id`: `{base}/ws/{session_id}`, with
/// `http`/`https` bases mapped onto `ws`/`wss`.
pub fn channel_url(base_url: &str, session_id: &str) -> Result<Url, ConnectionError> {
    let trimmed = base_url.trim().trim_end_matches('/');
    let invalid = |reason: &str| ConnectionError::InvalidAddress {
        address: trimmed.to_string(),
        reason: reason.to_string(),
    };

    if session_id.trim().is_empty() {
        return Err(invalid("session id is empty"));
    }

    let mut url = Url::parse(trimmed).map_err(|error| invalid(&error.to_string()))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        _ => return Err(invalid("scheme must be ws, wss, http or https")),
    };
    url.set_scheme(scheme)
        .map_err(|()| invalid("scheme cannot be changed"))?;

    {
        let mut path = url
            .path_segments_mut()
            .map_err(|()| invalid("cannot be a base"))?;
        path.pop_if_empty();
        path.push("ws");
        path.push(session_id);
    }

    Ok(url)
}
