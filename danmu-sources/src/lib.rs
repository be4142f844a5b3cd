//! Upstream platform adapters behind the `danmu-core` source contract.

pub mod bahamut;
pub mod bilibili;
pub mod client;
pub mod douban;
pub mod hanjutv;
pub mod iqiyi;
pub mod mango;
pub mod renren;
pub mod so360;
pub mod tencent;
pub mod tmdb;
pub mod translate;
pub mod vod;
pub mod youku;

use std::sync::Arc;

use danmu_core::config::ConfigRegistry;
use danmu_core::source::SourceRegistry;

pub use translate::MetadataTranslator;

/// Register every adapter in canonical order.
pub fn build_registry(config: &Arc<ConfigRegistry>) -> (SourceRegistry, Arc<MetadataTranslator>) {
    let tmdb = Arc::new(tmdb::TmdbSource::new(config.clone()));
    let douban = Arc::new(douban::DoubanSource::new());
    let translator = Arc::new(MetadataTranslator::new(tmdb.clone(), douban.clone()));

    let mut registry = SourceRegistry::new();
    registry.register(Arc::new(so360::So360Source::new()));
    registry.register(Arc::new(vod::VodSource::new(config.clone())));
    registry.register(tmdb);
    registry.register(douban);
    registry.register(Arc::new(tencent::TencentSource::new()));
    registry.register(Arc::new(youku::YoukuSource::new(config.clone())));
    registry.register(Arc::new(iqiyi::IqiyiSource::new()));
    registry.register(Arc::new(mango::MangoSource::new()));
    registry.register(Arc::new(bilibili::BilibiliSource::new(config.clone())));
    registry.register(Arc::new(renren::RenrenSource::new()));
    registry.register(Arc::new(hanjutv::HanjutvSource::new()));
    registry.register(Arc::new(bahamut::BahamutSource::new()));

    (registry, translator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use danmu_core::config::Settings;
    use std::collections::HashMap;

    #[test]
    fn test_registry_covers_every_known_source() {
        let config = Arc::new(ConfigRegistry::new(Settings::default(), HashMap::new()));
        let (registry, _) = build_registry(&config);
        for name in danmu_core::config::KNOWN_SOURCES {
            assert!(registry.get(name).is_some(), "missing adapter for {name}");
        }
    }

    #[test]
    fn test_comment_url_routing_per_platform() {
        let config = Arc::new(ConfigRegistry::new(Settings::default(), HashMap::new()));
        let (registry, _) = build_registry(&config);

        let cases = [
            ("https://v.qq.com/x/cover/abc/def.html", "tencent"),
            ("https://v.youku.com/v_show/id_XNTg5.html", "youku"),
            ("https://www.iqiyi.com/v_19rrabc.html", "iqiyi"),
            ("https://www.mgtv.com/b/336727/7056546.html", "imgo"),
            ("https://www.bilibili.com/video/BV1xx411c7mD", "bilibili"),
            ("https://b23.tv/xyz", "bilibili"),
            ("https://rrmj.plus/watch/123", "renren"),
            ("https://www.hanjutv.com/play/456", "hanjutv"),
            ("https://ani.gamer.com.tw/animeVideo.php?sn=34886", "bahamut"),
        ];
        for (url, expected) in cases {
            let source = registry.route_url(url);
            assert_eq!(
                source.map(|s| s.name()),
                Some(expected),
                "routing failed for {url}"
            );
        }
    }
}
