//! Name- and host-indexed registry of source adapters.

use std::collections::HashMap;
use std::sync::Arc;

use super::Source;

#[derive(Default)]
pub struct SourceRegistry {
    /// Registration order, used when no explicit order applies.
    sources: Vec<Arc<dyn Source>>,
    by_name: HashMap<&'static str, Arc<dyn Source>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, source: Arc<dyn Source>) {
        self.by_name.insert(source.name(), source.clone());
        self.sources.push(source);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Source>> {
        self.by_name.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Source>> {
        self.sources.iter()
    }

    /// Route a comment URL to the adapter owning its host.
    pub fn route_url(&self, url: &str) -> Option<Arc<dyn Source>> {
        let host = host_of(url)?;
        self.sources
            .iter()
            .find(|s| s.matches_host(&host))
            .cloned()
    }

    /// The platform name owning `url`'s host, if any adapter claims it.
    pub fn platform_for_url(&self, url: &str) -> Option<&'static str> {
        let host = host_of(url)?;
        self.sources
            .iter()
            .find(|s| s.matches_host(&host))
            .map(|s| s.name())
    }
}

/// Extract the lowercased host, tolerating scheme-less input.
pub fn host_of(url: &str) -> Option<String> {
    let candidate = if url.contains("://") {
        url.to_string()
    } else {
        format!("https://{url}")
    };
    url::Url::parse(&candidate)
        .ok()
        .and_then(|u| u.host_str().map(str::to_lowercase))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Danmaku;
    use crate::source::{RawAnime, RawEpisode};
    use crate::Result;
    use async_trait::async_trait;

    struct HostSource {
        name: &'static str,
        hosts: Vec<&'static str>,
    }

    #[async_trait]
    impl Source for HostSource {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn search(&self, _keyword: &str) -> Result<Vec<RawAnime>> {
            Ok(vec![])
        }

        async fn episodes(&self, _anime: &RawAnime) -> Result<Vec<RawEpisode>> {
            Ok(vec![])
        }

        async fn comments(&self, _url: &str) -> Result<Vec<Danmaku>> {
            Ok(vec![])
        }

        fn matches_host(&self, host: &str) -> bool {
            self.hosts.iter().any(|h| host == *h || host.ends_with(&format!(".{h}")))
        }
    }

    fn registry() -> SourceRegistry {
        let mut registry = SourceRegistry::new();
        registry.register(Arc::new(HostSource {
            name: "youku",
            hosts: vec!["youku.com"],
        }));
        registry.register(Arc::new(HostSource {
            name: "bilibili",
            hosts: vec!["bilibili.com", "b23.tv"],
        }));
        registry
    }

    #[test]
    fn test_url_routing() {
        let registry = registry();
        let youku = registry
            .route_url("https://v.youku.com/v_show/id_XNTg5.html")
            .unwrap();
        assert_eq!(youku.name(), "youku");

        let bili = registry
            .route_url("https://www.bilibili.com/video/BV1xx")
            .unwrap();
        assert_eq!(bili.name(), "bilibili");

        let short = registry.route_url("https://b23.tv/xyz").unwrap();
        assert_eq!(short.name(), "bilibili");

        assert!(registry.route_url("https://unknown.example.com/x").is_none());
    }

    #[test]
    fn test_host_of_tolerates_missing_scheme() {
        assert_eq!(host_of("v.qq.com/x/cover/abc").as_deref(), Some("v.qq.com"));
        assert_eq!(
            host_of("https://WWW.Bilibili.com/video").as_deref(),
            Some("www.bilibili.com")
        );
    }

    #[test]
    fn test_platform_for_url() {
        let registry = registry();
        assert_eq!(registry.platform_for_url("https://b23.tv/x"), Some("bilibili"));
        assert_eq!(registry.platform_for_url("https://nope.cn/x"), None);
    }
}
