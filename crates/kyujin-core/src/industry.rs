use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Fixed industry categories a listing is classified into.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Industry {
    ManufacturingConstruction,
    ItEngineering,
    MedicalCare,
    ServiceRetail,
    SalesClerical,
    #[default]
    Other,
}

impl Industry {
    pub fn as_str(&self) -> &'static str {
        match self {
            Industry::ManufacturingConstruction => "manufacturing_construction",
            Industry::ItEngineering => "it_engineering",
            Industry::MedicalCare => "medical_care",
            Industry::ServiceRetail => "service_retail",
            Industry::SalesClerical => "sales_clerical",
            Industry::Other => "other",
        }
    }

    /// Display name used by the listing sites and in reports.
    pub fn label(&self) -> &'static str {
        match self {
            Industry::ManufacturingConstruction => "製造・建設",
            Industry::ItEngineering => "IT・エンジニア",
            Industry::MedicalCare => "医療・介護",
            Industry::ServiceRetail => "サービス・販売",
            Industry::SalesClerical => "営業・事務",
            Industry::Other => "その他",
        }
    }
}

impl fmt::Display for Industry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Industry {
    type Err = String;

    /// Accepts either the slug or the Japanese label.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let all = [
            Industry::ManufacturingConstruction,
            Industry::ItEngineering,
            Industry::MedicalCare,
            Industry::ServiceRetail,
            Industry::SalesClerical,
            Industry::Other,
        ];
        let lowered = s.trim().to_lowercase();
        all.into_iter()
            .find(|i| i.as_str() == lowered || i.label() == s.trim())
            .ok_or_else(|| format!("Unknown industry: {}", s))
    }
}

/// Keyword sets in evaluation order. The sets overlap, so order decides ties.
const INDUSTRY_KEYWORDS: &[(Industry, &[&str])] = &[
    (
        Industry::ManufacturingConstruction,
        &[
            "工場", "製造", "建設", "施工管理", "施工", "電気工事", "設備", "機械", "溶接",
            "組立", "検品", "倉庫", "物流", "配送", "現場", "作業員",
        ],
    ),
    (
        Industry::ItEngineering,
        &[
            "エンジニア",
            "プログラマ",
            "SE",
            "開発",
            "IT",
            "WEB",
            "システム",
            "ソフトウェア",
            "インフラ",
            "ネットワーク",
            "データ",
            "AI",
            "機械学習",
        ],
    ),
    (
        Industry::MedicalCare,
        &[
            "看護", "介護", "医療", "病院", "クリニック", "福祉", "保育", "ケア", "ヘルパー",
            "リハビリ", "薬剤", "検査技師", "歯科",
        ],
    ),
    (
        Industry::ServiceRetail,
        &[
            "販売", "接客", "店舗", "レジ", "飲食", "調理", "ホテル", "サービス", "清掃", "美容",
            "理容",
        ],
    ),
    (
        Industry::SalesClerical,
        &[
            "営業",
            "事務",
            "経理",
            "総務",
            "人事",
            "秘書",
            "受付",
            "コールセンター",
            "カスタマー",
            "サポート",
            "管理",
        ],
    ),
];

/// Classify a job title into an [`Industry`].
///
/// Case-insensitive substring match against the title only; the first
/// category with a matching keyword wins. Keywords are stored uppercase.
pub fn classify(title: &str) -> Industry {
    if title.trim().is_empty() {
        return Industry::Other;
    }

    let upper = title.to_uppercase();
    INDUSTRY_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| upper.contains(k)))
        .map(|(industry, _)| *industry)
        .unwrap_or(Industry::Other)
}
