use reqwest::header::HeaderMap;
use crate::client::config::Config;
use crate::client::consts::SESSION_ID_HEADER;

pub fn endpoint(config: &Config, path: &str) -> String {
    format!("{}/{}", config.base_url(), path.trim_start_matches('/'))
}

/// The backend may announce the conversation id in a header before the body starts streaming.
pub fn session_id_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_endpoint_joins_single_slash() {
        let config = Config::builder().with_base_url("http://localhost:8000/").build();
        assert_eq!(
            endpoint(&config, "/generate-response"),
            "http://localhost:8000/generate-response"
        );
    }

    #[test]
    fn test_session_id_header_ignores_blank_values() {
        let mut headers = HeaderMap::new();
        assert_eq!(session_id_from_headers(&headers), None);

        headers.insert(SESSION_ID_HEADER, HeaderValue::from_static("  "));
        assert_eq!(session_id_from_headers(&headers), None);

        headers.insert(SESSION_ID_HEADER, HeaderValue::from_static("abc-123"));
        assert_eq!(session_id_from_headers(&headers).as_deref(), Some("abc-123"));
    }
}
