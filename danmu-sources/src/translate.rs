//! Foreign-title translation for the match engine: TMDB first, Douban as the
//! fallback.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use danmu_core::source::orchestrator::TitleTranslator;

use crate::douban::DoubanSource;
use crate::tmdb::TmdbSource;

pub struct MetadataTranslator {
    tmdb: Arc<TmdbSource>,
    douban: Arc<DoubanSource>,
}

impl MetadataTranslator {
    pub fn new(tmdb: Arc<TmdbSource>, douban: Arc<DoubanSource>) -> Self {
        Self { tmdb, douban }
    }
}

#[async_trait]
impl TitleTranslator for MetadataTranslator {
    async fn to_chinese(&self, title: &str) -> Option<String> {
        // Already CJK: nothing to translate.
        if title
            .chars()
            .any(|c| matches!(c as u32, 0x4E00..=0x9FFF))
        {
            return None;
        }

        if let Some(chinese) = self.tmdb.chinese_title(title).await {
            debug!(title, chinese, "TMDB translated title");
            return Some(chinese);
        }
        if let Some(chinese) = self.douban.chinese_title(title).await {
            debug!(title, chinese, "Douban translated title");
            return Some(chinese);
        }
        None
    }
}
