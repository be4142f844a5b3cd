//! Traditional → Simplified Chinese conversion.
//!
//! Per-character table covering the characters that actually show up in
//! danmaku (Bahamut and Hanjutv streams arrive in Traditional). Characters
//! outside the table pass through unchanged.

use once_cell::sync::Lazy;
use std::collections::HashMap;

const TRADITIONAL: &str = "為這說對時會動經發見\
馬鳥龍東車長門問間們\
來個裡後學國買賣讀書\
話語誰請謝體點電腦視\
聽寫應該還沒從過進遠\
運選錢銀飛機場漢氣雲\
風華萬與業樂愛戰勝圖\
畫數劇臺灣歷師藝術節\
觀眾嗎喲歲幾兩隻頭臉\
淚開關熱鬧靜幹壞舊紅\
綠藍黃顏聲響讓變難題\
錯復習練級優異當務員\
專區縣鎮鄉島橋樓層廣\
園遊戲館廳飯麵魚雞豬\
鴨湯鹹餓飽夢憶記戀親\
離別歡懼驚嚇煩惱憂鬱\
傷醫藥癒壽財寶貴賤窮\
強敗贏輸賽競爭鬥殺滅\
絕斷續連繼維護衛擊禦\
軍隊將帥領導統權義責\
調談論議訓詞詩證識譯\
無處產實現總結約紙給\
絲網羅聞閃陣陽陰隨際\
頁頂項順須顧驗騎髮鐘\
錄鏡鐵針銷鎖鍵鑰錶鋼\
幫辦單雙歸鳳塵慶廢廟\
彈彎懷憲戶啟敵攜斃曉";

const SIMPLIFIED: &str = "为这说对时会动经发见\
马鸟龙东车长门问间们\
来个里后学国买卖读书\
话语谁请谢体点电脑视\
听写应该还没从过进远\
运选钱银飞机场汉气云\
风华万与业乐爱战胜图\
画数剧台湾历师艺术节\
观众吗哟岁几两只头脸\
泪开关热闹静干坏旧红\
绿蓝黄颜声响让变难题\
错复习练级优异当务员\
专区县镇乡岛桥楼层广\
园游戏馆厅饭面鱼鸡猪\
鸭汤咸饿饱梦忆记恋亲\
离别欢惧惊吓烦恼忧郁\
伤医药愈寿财宝贵贱穷\
强败赢输赛竞争斗杀灭\
绝断续连继维护卫击御\
军队将帅领导统权义责\
调谈论议训词诗证识译\
无处产实现总结约纸给\
丝网罗闻闪阵阳阴随际\
页顶项顺须顾验骑发钟\
录镜铁针销锁键钥表钢\
帮办单双归凤尘庆废庙\
弹弯怀宪户启敌携毙晓";

static TABLE: Lazy<HashMap<char, char>> = Lazy::new(|| {
    TRADITIONAL.chars().zip(SIMPLIFIED.chars()).collect()
});

/// Convert Traditional characters in `text` to Simplified.
pub fn to_simplified(text: &str) -> String {
    if text.is_ascii() {
        return text.to_string();
    }
    text.chars()
        .map(|c| TABLE.get(&c).copied().unwrap_or(c))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_aligned() {
        assert_eq!(TRADITIONAL.chars().count(), SIMPLIFIED.chars().count());
    }

    #[test]
    fn test_conversion() {
        assert_eq!(to_simplified("這個說話"), "这个说话");
        assert_eq!(to_simplified("開門見山"), "开门见山");
    }

    #[test]
    fn test_untouched_text() {
        assert_eq!(to_simplified("already simplified 你好"), "already simplified 你好");
        assert_eq!(to_simplified("ascii only"), "ascii only");
    }
}
