use reqwest::Url;

/// The base URL used when none is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Builder for [`HttpBackendConfig`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct HttpBackendConfigBuilder {
    base_url: Option<String>,
}

impl HttpBackendConfigBuilder {
    /// Creates a builder with default settings.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the base URL of the backend, e.g. `http://localhost:8000`.
    ///
    /// The `/api/...` paths are appended to it.
    #[inline]
    pub fn with_base_url<S: Into<String>>(mut self, base_url: S) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Builds the configuration.
    #[inline]
    pub fn build(self) -> HttpBackendConfig {
        let base_url = self
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        HttpBackendConfig {
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }
}

/// Configuration for the HTTP backend.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct HttpBackendConfig {
    pub(crate) base_url: String,
}

impl HttpBackendConfig {
    /// Returns the base URL, without a trailing slash.
    #[inline]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the URL of an API resource below `/api`.
    ///
    /// Each segment is percent-encoded on its own, so an id containing `/`,
    /// `?` or `#` stays a single path segment.
    pub(crate) fn api_url(&self, segments: &[&str]) -> Result<Url, String> {
        let base_url = &self.base_url;
        let mut url = Url::parse(base_url)
            .map_err(|err| format!("invalid base URL {base_url}: {err}"))?;
        url.path_segments_mut()
            .map_err(|()| format!("base URL {base_url} can't have a path"))?
            .pop_if_empty()
            .push("api")
            .extend(segments);
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_base_url() {
        let config = HttpBackendConfigBuilder::new().build();
        assert_eq!(config.base_url(), DEFAULT_BASE_URL);
    }

    #[test]
    fn test_trailing_slash() {
        let config = HttpBackendConfigBuilder::new()
            .with_base_url("https://chat.example.com/")
            .build();
        assert_eq!(
            config.api_url(&["conversations"]).unwrap().as_str(),
            "https://chat.example.com/api/conversations"
        );
    }

    #[test]
    fn test_base_url_with_path() {
        let config = HttpBackendConfigBuilder::new()
            .with_base_url("https://chat.example.com/proxy/")
            .build();
        assert_eq!(
            config.api_url(&["conversations", "c1"]).unwrap().as_str(),
            "https://chat.example.com/proxy/api/conversations/c1"
        );
    }

    #[test]
    fn test_id_is_one_segment() {
        let config = HttpBackendConfigBuilder::new().build();
        let url = config
            .api_url(&["conversations", "a/b?c#d", "chat"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8000/api/conversations/a%2Fb%3Fc%23d/chat"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let config = HttpBackendConfigBuilder::new()
            .with_base_url("localhost:8000")
            .build();
        assert!(config.api_url(&["conversations"]).is_err());
    }
}
