//! Prefecture codes and region groupings used for area-scoped crawls.

/// Prefecture name → two-digit code, in JIS order.
const PREFECTURE_CODES: &[(&str, &str)] = &[
    ("北海道", "01"),
    ("青森県", "02"),
    ("岩手県", "03"),
    ("宮城県", "04"),
    ("秋田県", "05"),
    ("山形県", "06"),
    ("福島県", "07"),
    ("茨城県", "08"),
    ("栃木県", "09"),
    ("群馬県", "10"),
    ("埼玉県", "11"),
    ("千葉県", "12"),
    ("東京都", "13"),
    ("神奈川県", "14"),
    ("新潟県", "15"),
    ("富山県", "16"),
    ("石川県", "17"),
    ("福井県", "18"),
    ("山梨県", "19"),
    ("長野県", "20"),
    ("岐阜県", "21"),
    ("静岡県", "22"),
    ("愛知県", "23"),
    ("三重県", "24"),
    ("滋賀県", "25"),
    ("京都府", "26"),
    ("大阪府", "27"),
    ("兵庫県", "28"),
    ("奈良県", "29"),
    ("和歌山県", "30"),
    ("鳥取県", "31"),
    ("島根県", "32"),
    ("岡山県", "33"),
    ("広島県", "34"),
    ("山口県", "35"),
    ("徳島県", "36"),
    ("香川県", "37"),
    ("愛媛県", "38"),
    ("高知県", "39"),
    ("福岡県", "40"),
    ("佐賀県", "41"),
    ("長崎県", "42"),
    ("熊本県", "43"),
    ("大分県", "44"),
    ("宮崎県", "45"),
    ("鹿児島県", "46"),
    ("沖縄県", "47"),
];

/// Region key, display name, member prefectures.
const REGIONS: &[(&str, &str, &[&str])] = &[
    (
        "hokkaido_tohoku",
        "北海道・東北",
        &["北海道", "青森県", "岩手県", "宮城県", "秋田県", "山形県", "福島県"],
    ),
    (
        "kanto",
        "関東",
        &["茨城県", "栃木県", "群馬県", "埼玉県", "千葉県", "東京都", "神奈川県"],
    ),
    (
        "chubu",
        "中部",
        &[
            "新潟県", "富山県", "石川県", "福井県", "山梨県", "長野県", "岐阜県", "静岡県",
            "愛知県",
        ],
    ),
    (
        "kansai",
        "関西",
        &["三重県", "滋賀県", "京都府", "大阪府", "兵庫県", "奈良県", "和歌山県"],
    ),
    (
        "chugoku",
        "中国",
        &["鳥取県", "島根県", "岡山県", "広島県", "山口県"],
    ),
    ("shikoku", "四国", &["徳島県", "香川県", "愛媛県", "高知県"]),
    (
        "kyushu",
        "九州・沖縄",
        &[
            "福岡県", "佐賀県", "長崎県", "熊本県", "大分県", "宮崎県", "鹿児島県", "沖縄県",
        ],
    ),
];

/// Key that expands to every prefecture.
pub const ALL_REGIONS: &str = "all";

/// Look up the two-digit code for a prefecture name.
pub fn prefecture_code(name: &str) -> Option<&'static str> {
    let name = name.trim();
    PREFECTURE_CODES
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, code)| *code)
}

/// The prefecture a free-text location lies in, if one is named.
///
/// Names may appear without their 都/府/県 suffix. The earliest mention wins,
/// so 東京都 is not mistaken for 京都府.
pub fn prefecture_in(location: &str) -> Option<&'static str> {
    PREFECTURE_CODES
        .iter()
        .filter_map(|&(name, _)| {
            let stem = match name {
                "北海道" => name,
                _ => name.strip_suffix(['都', '府', '県']).unwrap_or(name),
            };
            location.find(stem).map(|at| (at, name))
        })
        .min_by_key(|(at, _)| *at)
        .map(|(_, name)| name)
}

/// Ordered prefectures for a region key, or `None` if the key is unknown.
pub fn prefectures_by_region(region: &str) -> Option<Vec<&'static str>> {
    let region = region.trim().to_lowercase();
    if region == ALL_REGIONS {
        return Some(PREFECTURE_CODES.iter().map(|(n, _)| *n).collect());
    }

    REGIONS
        .iter()
        .find(|(key, _, _)| *key == region)
        .map(|(_, _, prefectures)| prefectures.to_vec())
}

/// All region keys with their display names, `all` last.
pub fn regions() -> Vec<(&'static str, &'static str)> {
    REGIONS
        .iter()
        .map(|(key, name, _)| (*key, *name))
        .chain(std::iter::once((ALL_REGIONS, "全国")))
        .collect()
}
