//! Traditional -> simplified character fold.
//!
//! The ASR collaborator is asked for simplified output; this fold catches
//! the high-frequency traditional forms that still leak through. It is a
//! lookup over common characters, not a full conversion.

/// Fold common traditional characters to simplified.
pub fn to_simplified(text: &str) -> String {
    text.chars().map(fold_char).collect()
}

fn fold_char(c: char) -> char {
    match c {
        '著' => '着',
        '裡' | '裏' => '里',
        '來' => '来',
        '說' => '说',
        '話' => '话',
        '過' => '过',
        '還' => '还',
        '這' => '这',
        '們' => '们',
        '時' => '时',
        '個' => '个',
        '為' => '为',
        '與' => '与',
        '點' => '点',
        '開' => '开',
        '關' => '关',
        '門' => '门',
        '問' => '问',
        '間' => '间',
        '聽' => '听',
        '見' => '见',
        '覺' => '觉',
        '對' => '对',
        '錯' => '错',
        '長' => '长',
        '張' => '张',
        '場' => '场',
        '發' => '发',
        '頭' => '头',
        '臉' => '脸',
        '眼' => '眼',
        '聲' => '声',
        '氣' => '气',
        '風' => '风',
        '雲' => '云',
        '電' => '电',
        '車' => '车',
        '馬' => '马',
        '鳥' => '鸟',
        '魚' => '鱼',
        '龍' => '龙',
        '書' => '书',
        '寫' => '写',
        '讀' => '读',
        '學' => '学',
        '會' => '会',
        '語' => '语',
        '誰' => '谁',
        '幾' => '几',
        '裝' => '装',
        '從' => '从',
        '後' => '后',
        '前' => '前',
        '動' => '动',
        '靜' => '静',
        '愛' => '爱',
        '樂' => '乐',
        '憶' => '忆',
        '夢' => '梦',
        '淚' => '泪',
        '飛' => '飞',
        '遠' => '远',
        '近' => '近',
        '邊' => '边',
        '萬' => '万',
        '億' => '亿',
        '數' => '数',
        '隻' => '只',
        '體' => '体',
        '讓' => '让',
        '給' => '给',
        '請' => '请',
        '謝' => '谢',
        '歲' => '岁',
        '歡' => '欢',
        '陽' => '阳',
        '陰' => '阴',
        '燈' => '灯',
        '紅' => '红',
        '綠' => '绿',
        '藍' => '蓝',
        '黃' => '黄',
        '黑' => '黑',
        '白' => '白',
        '無' => '无',
        '處' => '处',
        '難' => '难',
        '離' => '离',
        '鐘' => '钟',
        '錢' => '钱',
        '銀' => '银',
        '鐵' => '铁',
        '國' => '国',
        '園' => '园',
        '圖' => '图',
        '團' => '团',
        '員' => '员',
        '貝' => '贝',
        '買' => '买',
        '賣' => '卖',
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_common_traditional_forms() {
        assert_eq!(to_simplified("他望著遠方"), "他望着远方");
        assert_eq!(to_simplified("說話的時間"), "说话的时间");
    }

    #[test]
    fn leaves_simplified_text_alone() {
        assert_eq!(to_simplified("他望着远方"), "他望着远方");
        assert_eq!(to_simplified("hello 123"), "hello 123");
    }
}
