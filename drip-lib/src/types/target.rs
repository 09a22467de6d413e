use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer};
use url::Url;

use crate::{ErrorKind, Result};

/// Placeholder in a target template that is replaced by the request index
pub const INDEX_PLACEHOLDER: &str = "{}";

/// Default target, a local web service that routes every path.
pub const DEFAULT_TARGET: &str = "http://localhost:8080/{}";

/// The URL (or URL template) every request of a run is sent to.
///
/// A template may contain `{}` once or more; each occurrence is replaced by
/// the index of the request so that every request hits its own path.
///
/// ```
/// use drip_lib::Target;
///
/// let target: Target = "http://localhost:8080/{}".parse().unwrap();
/// assert_eq!(target.url_for(7).unwrap().as_str(), "http://localhost:8080/7");
///
/// let target: Target = "http://localhost:8080/health".parse().unwrap();
/// assert_eq!(target.url_for(7).unwrap().as_str(), "http://localhost:8080/health");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    template: String,
}

impl Target {
    /// Create a new target from a URL or URL template.
    ///
    /// # Errors
    ///
    /// Returns an error if the template does not form a valid URL once the
    /// placeholder is filled in.
    pub fn new<S: Into<String>>(template: S) -> Result<Self> {
        let target = Self {
            template: template.into(),
        };
        target.url_for(0)?;
        Ok(target)
    }

    /// Whether each request gets its own URL
    #[must_use]
    pub fn is_template(&self) -> bool {
        self.template.contains(INDEX_PLACEHOLDER)
    }

    /// Resolve the URL for the request with the given index.
    ///
    /// # Errors
    ///
    /// Returns an error if the resolved string is not a valid URL.
    pub fn url_for(&self, index: usize) -> Result<Url> {
        let raw = self
            .template
            .replace(INDEX_PLACEHOLDER, &index.to_string());
        Url::parse(&raw).map_err(|e| ErrorKind::InvalidTarget(raw, e))
    }

    /// The unresolved template
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.template
    }
}

impl Default for Target {
    fn default() -> Self {
        Self {
            template: DEFAULT_TARGET.to_string(),
        }
    }
}

impl FromStr for Target {
    type Err = ErrorKind;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.template)
    }
}

impl<'de> Deserialize<'de> for Target {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let template = String::deserialize(deserializer)?;
        Self::new(template).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("http://localhost:8080/{}", 3, "http://localhost:8080/3")]
    #[case("http://localhost:8080/{}/{}", 12, "http://localhost:8080/12/12")]
    #[case("https://example.com/ping?id={}", 0, "https://example.com/ping?id=0")]
    #[case("https://example.com/", 42, "https://example.com/")]
    fn test_url_for(#[case] template: &str, #[case] index: usize, #[case] expected: &str) {
        let target = Target::new(template).unwrap();
        assert_eq!(target.url_for(index).unwrap().as_str(), expected);
    }

    #[test]
    fn test_invalid_target() {
        let err = Target::new("not a url/{}").unwrap_err();
        assert!(matches!(err, ErrorKind::InvalidTarget(..)));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_default_target_is_template() {
        let target = Target::default();
        assert!(target.is_template());
        assert_eq!(target.to_string(), DEFAULT_TARGET);
    }

    #[test]
    fn test_deserialize() {
        #[derive(Deserialize)]
        struct Wrapper {
            url: Target,
        }
        let w: Wrapper = toml::from_str(r#"url = "http://127.0.0.1:9000/{}""#).unwrap();
        assert_eq!(w.url.url_for(1).unwrap().port(), Some(9000));

        assert!(toml::from_str::<Wrapper>(r#"url = "::nope""#).is_err());
    }
}
