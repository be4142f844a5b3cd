//! Platform emoji shortcodes.
//!
//! Upstream comment bodies carry `[name]` shortcodes from each platform's
//! emote set. Known names are replaced with a unicode equivalent; unknown
//! names pass through verbatim.

use once_cell::sync::Lazy;
use std::collections::HashMap;

static SHORTCODES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        // QQ / Tencent video
        ("微笑", "🙂"),
        ("撇嘴", "😒"),
        ("色", "😍"),
        ("发呆", "😳"),
        ("得意", "😎"),
        ("流泪", "😭"),
        ("害羞", "☺️"),
        ("闭嘴", "🤐"),
        ("睡", "😴"),
        ("大哭", "😭"),
        ("尴尬", "😅"),
        ("发怒", "😡"),
        ("调皮", "😜"),
        ("呲牙", "😁"),
        ("惊讶", "😲"),
        ("难过", "🙁"),
        ("囧", "😖"),
        ("抓狂", "😫"),
        ("吐", "🤮"),
        ("偷笑", "🤭"),
        ("愉快", "😊"),
        ("白眼", "🙄"),
        ("傲慢", "😤"),
        ("困", "😪"),
        ("惊恐", "😱"),
        ("憨笑", "😄"),
        ("悠闲", "😌"),
        ("咒骂", "🤬"),
        ("疑问", "❓"),
        ("嘘", "🤫"),
        ("晕", "😵"),
        ("衰", "😩"),
        ("骷髅", "💀"),
        ("敲打", "🔨"),
        ("再见", "👋"),
        ("擦汗", "😓"),
        ("鼓掌", "👏"),
        ("坏笑", "😏"),
        ("右哼哼", "😤"),
        ("鄙视", "😒"),
        ("委屈", "🥺"),
        ("快哭了", "😢"),
        ("亲亲", "😘"),
        ("可怜", "🥺"),
        ("笑脸", "😄"),
        ("生病", "😷"),
        ("脸红", "😳"),
        ("破涕为笑", "😂"),
        ("恐惧", "😱"),
        ("失望", "😞"),
        ("无语", "😑"),
        ("嘿哈", "😬"),
        ("捂脸", "🤦"),
        ("奸笑", "😏"),
        ("机智", "🤓"),
        ("皱眉", "😟"),
        ("耶", "✌️"),
        ("吃瓜", "🍉"),
        ("加油", "💪"),
        ("汗", "💦"),
        ("天啊", "😱"),
        ("社会社会", "🤝"),
        ("旺柴", "🐶"),
        ("好的", "👌"),
        ("打脸", "🤛"),
        ("哇", "🤩"),
        ("翻白眼", "🙄"),
        ("666", "👍"),
        ("让我看看", "👀"),
        ("叹气", "😮‍💨"),
        ("苦涩", "😥"),
        ("裂开", "💔"),
        ("嘴唇", "💋"),
        ("爱心", "❤️"),
        ("心碎", "💔"),
        ("拥抱", "🤗"),
        ("强", "👍"),
        ("弱", "👎"),
        ("握手", "🤝"),
        ("胜利", "✌️"),
        ("抱拳", "🙏"),
        ("勾引", "🫰"),
        ("拳头", "✊"),
        ("OK", "👌"),
        ("玫瑰", "🌹"),
        ("凋谢", "🥀"),
        ("菜刀", "🔪"),
        ("西瓜", "🍉"),
        ("啤酒", "🍺"),
        ("咖啡", "☕"),
        ("猪头", "🐷"),
        ("月亮", "🌙"),
        ("太阳", "☀️"),
        ("礼物", "🎁"),
        ("炸弹", "💣"),
        ("便便", "💩"),
        ("闪电", "⚡"),
        ("发抖", "🥶"),
        ("怄火", "😡"),
        ("转圈", "💫"),
        // Bilibili emotes
        ("doge", "🐶"),
        ("笑哭", "😂"),
        ("妙啊", "👏"),
        ("滑稽", "😏"),
        ("喜欢", "😍"),
        ("偷感", "🫣"),
        ("思考", "🤔"),
        ("大笑", "😆"),
        ("辣眼睛", "🫣"),
        ("呆", "😐"),
        ("狗头", "🐶"),
        ("保卫萝卜", "🥕"),
        ("星星眼", "🤩"),
        ("点赞", "👍"),
        ("泪目", "🥲"),
        ("喝彩", "🎉"),
        ("打call", "📣"),
        ("锦鲤", "🐟"),
        ("柠檬", "🍋"),
        ("干杯", "🍻"),
        // Youku / iQiyi / Mango / Douyin variants
        ("赞", "👍"),
        ("哈哈", "😄"),
        ("笑cry", "😂"),
        ("飞吻", "😘"),
        ("悲伤", "😢"),
        ("酷", "😎"),
        ("抠鼻", "🤏"),
        ("黑线", "😓"),
        ("互粉", "🤝"),
        ("心", "❤️"),
        ("伤心", "💔"),
        ("鲜花", "🌹"),
        ("蛋糕", "🎂"),
        ("撒花", "🎉"),
        ("鼓励", "💪"),
        ("求抱抱", "🤗"),
        ("比心", "🫰"),
        ("灵机一动", "💡"),
        ("石化", "🗿"),
        ("吐舌", "😛"),
        ("飞机", "✈️"),
        ("威武", "💪"),
        ("月饼", "🥮"),
        ("围观", "👀"),
    ])
});

/// Replace `[name]` shortcodes with their unicode equivalent. Unknown names
/// (and unmatched brackets) are kept verbatim.
pub fn replace_shortcodes(text: &str) -> String {
    if !text.contains('[') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find('[') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];
        match tail.find(']') {
            Some(close) => {
                let name = &tail[1..close];
                match SHORTCODES.get(name) {
                    Some(emoji) => out.push_str(emoji),
                    None => out.push_str(&tail[..=close]),
                }
                rest = &tail[close + 1..];
            }
            None => {
                out.push_str(tail);
                return out;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_shortcode_replaced() {
        assert_eq!(replace_shortcodes("前方高能[doge]"), "前方高能🐶");
        assert_eq!(replace_shortcodes("[微笑][微笑]"), "🙂🙂");
    }

    #[test]
    fn test_unknown_shortcode_kept() {
        assert_eq!(replace_shortcodes("[不存在的表情]x"), "[不存在的表情]x");
    }

    #[test]
    fn test_unmatched_bracket_kept() {
        assert_eq!(replace_shortcodes("a[b"), "a[b");
        assert_eq!(replace_shortcodes("no brackets"), "no brackets");
    }
}
