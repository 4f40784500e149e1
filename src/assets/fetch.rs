use std::path::PathBuf;

use anyhow::Context;
use serde::Deserialize;

use crate::foundation::error::{ReCanvasError, ReCanvasResult};

/// Image transport. Implementations are shared with loader threads.
pub trait ImageFetcher: Send + Sync {
    /// Whether `url` may be fetched at all. Denied URLs are never passed to [`Self::fetch`].
    fn can_fetch(&self, url: &str) -> bool {
        let _ = url;
        true
    }

    fn fetch(&self, url: &str) -> ReCanvasResult<Vec<u8>>;
}

/// Which URLs the default fetcher is allowed to load.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "hosts")]
pub enum FetchPolicy {
    /// Local files and any http(s) URL.
    AllowAll,
    /// http(s) URLs only; local files are refused.
    #[default]
    RemoteOnly,
    /// `file://` URLs and plain paths only.
    LocalOnly,
    /// Local files plus http(s) URLs whose host is listed.
    AllowHosts(Vec<String>),
    DenyAll,
}

#[derive(Debug, PartialEq, Eq)]
enum Source {
    Local(PathBuf),
    Remote { host: String },
}

fn classify(url: &str) -> Option<Source> {
    if let Some(path) = url.strip_prefix("file://") {
        return Some(Source::Local(PathBuf::from(path)));
    }
    for scheme in ["http://", "https://"] {
        if let Some(rest) = url.strip_prefix(scheme) {
            let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
            let host = authority
                .rsplit('@')
                .next()
                .unwrap_or_default()
                .split(':')
                .next()
                .unwrap_or_default();
            return Some(Source::Remote {
                host: host.to_ascii_lowercase(),
            });
        }
    }
    if url.contains("://") || url.starts_with("data:") || url.is_empty() {
        return None;
    }
    Some(Source::Local(PathBuf::from(url)))
}

impl FetchPolicy {
    pub fn permits(&self, url: &str) -> bool {
        match (self, classify(url)) {
            (_, None) | (Self::DenyAll, _) => false,
            (Self::AllowAll, Some(_)) => true,
            (Self::RemoteOnly, Some(src)) => matches!(src, Source::Remote { .. }),
            (Self::LocalOnly, Some(src)) => matches!(src, Source::Local(_)),
            (Self::AllowHosts(_), Some(Source::Local(_))) => true,
            (Self::AllowHosts(hosts), Some(Source::Remote { host })) => {
                hosts.iter().any(|h| h.eq_ignore_ascii_case(&host))
            }
        }
    }
}

/// Fetches `file://` URLs, local paths and (with the `http` feature) http(s) URLs.
pub struct DefaultFetcher {
    policy: FetchPolicy,
    #[cfg(feature = "http")]
    client: reqwest::blocking::Client,
}

impl Default for DefaultFetcher {
    fn default() -> Self {
        Self::new(FetchPolicy::default())
    }
}

impl DefaultFetcher {
    pub fn new(policy: FetchPolicy) -> Self {
        Self {
            policy,
            #[cfg(feature = "http")]
            client: reqwest::blocking::Client::new(),
        }
    }

    pub fn policy(&self) -> &FetchPolicy {
        &self.policy
    }

    #[cfg(feature = "http")]
    fn fetch_remote(&self, url: &str) -> ReCanvasResult<Vec<u8>> {
        let resp = self
            .client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| ReCanvasError::fetch(format!("GET {url}: {e}")))?;
        let bytes = resp
            .bytes()
            .map_err(|e| ReCanvasError::fetch(format!("read body of {url}: {e}")))?;
        Ok(bytes.to_vec())
    }

    #[cfg(not(feature = "http"))]
    fn fetch_remote(&self, url: &str) -> ReCanvasResult<Vec<u8>> {
        Err(ReCanvasError::fetch(format!(
            "cannot fetch {url}: built without the `http` feature"
        )))
    }
}

impl ImageFetcher for DefaultFetcher {
    fn can_fetch(&self, url: &str) -> bool {
        self.policy.permits(url)
    }

    fn fetch(&self, url: &str) -> ReCanvasResult<Vec<u8>> {
        match classify(url) {
            Some(Source::Local(path)) => {
                let bytes = std::fs::read(&path)
                    .with_context(|| format!("read image file {}", path.display()))?;
                Ok(bytes)
            }
            Some(Source::Remote { .. }) => self.fetch_remote(url),
            None => Err(ReCanvasError::fetch(format!("unsupported url: {url}"))),
        }
    }
}

impl std::fmt::Debug for DefaultFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultFetcher")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_urls() {
        assert_eq!(
            classify("https://user@Example.com:8080/a.png"),
            Some(Source::Remote {
                host: "example.com".to_string()
            })
        );
        assert_eq!(
            classify("file:///tmp/a.png"),
            Some(Source::Local(PathBuf::from("/tmp/a.png")))
        );
        assert_eq!(classify("img/a.png"), Some(Source::Local(PathBuf::from("img/a.png"))));
        assert_eq!(classify("ftp://x/y"), None);
        assert_eq!(classify("data:image/png;base64,AAAA"), None);
    }

    #[test]
    fn policies() {
        let remote = "https://cdn.example.com/a.png";
        assert!(FetchPolicy::AllowAll.permits(remote));
        assert!(!FetchPolicy::LocalOnly.permits(remote));
        assert!(FetchPolicy::LocalOnly.permits("/tmp/a.png"));
        assert!(!FetchPolicy::DenyAll.permits("/tmp/a.png"));
        assert!(FetchPolicy::RemoteOnly.permits(remote));
        assert!(!FetchPolicy::RemoteOnly.permits("/etc/passwd"));
        assert!(!FetchPolicy::RemoteOnly.permits("file:///etc/passwd"));
        let hosts = FetchPolicy::AllowHosts(vec!["CDN.example.com".to_string()]);
        assert!(hosts.permits(remote));
        assert!(!hosts.permits("https://evil.test/a.png"));
    }

    #[test]
    fn policy_deserializes_from_json() {
        let p: FetchPolicy =
            serde_json::from_str(r#"{"kind":"allow_hosts","hosts":["a.test"]}"#).unwrap();
        assert_eq!(p, FetchPolicy::AllowHosts(vec!["a.test".to_string()]));
        let p: FetchPolicy = serde_json::from_str(r#"{"kind":"local_only"}"#).unwrap();
        assert_eq!(p, FetchPolicy::LocalOnly);
    }

    #[test]
    fn default_fetcher_refuses_local_files() {
        assert_eq!(FetchPolicy::default(), FetchPolicy::RemoteOnly);
        let f = DefaultFetcher::default();
        assert!(!f.can_fetch("/etc/passwd"));
        assert!(!f.can_fetch("file:///etc/passwd"));
        assert!(f.can_fetch("https://cdn.example.com/a.png"));
    }

    #[test]
    fn missing_local_file_is_an_error() {
        let f = DefaultFetcher::new(FetchPolicy::LocalOnly);
        assert!(f.fetch("/definitely/not/here.png").is_err());
    }
}
