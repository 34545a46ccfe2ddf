use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::industry::{Industry, classify};
use crate::region::prefecture_in;
use crate::source::ListingSource;
use crate::wage::{Compensation, PayPeriod};

/// Titles longer than this are truncated (by character, not byte).
pub const MAX_TITLE_CHARS: usize = 100;

/// Truncate a title to [`MAX_TITLE_CHARS`] characters after trimming.
pub fn truncate_title(title: &str) -> String {
    title.trim().chars().take(MAX_TITLE_CHARS).collect()
}

/// One posting as read off one result page, before classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingDraft {
    pub title: String,
    pub company: String,
    pub location: String,
    pub wage_min: u64,
    pub wage_max: u64,
    /// Period as detected on the page; annual is kept here for audit.
    pub pay_period: PayPeriod,
    pub employment_type: Option<String>,
    pub source_url: Option<String>,
    pub source: ListingSource,
}

impl ListingDraft {
    pub fn new(source: ListingSource, title: &str) -> Self {
        Self {
            title: truncate_title(title),
            company: String::new(),
            location: String::new(),
            wage_min: 0,
            wage_max: 0,
            pay_period: PayPeriod::Unknown,
            employment_type: None,
            source_url: None,
            source,
        }
    }

    pub fn compensation(&self) -> Compensation {
        Compensation {
            min: self.wage_min,
            max: self.wage_max,
            period: self.pay_period,
        }
    }

    pub fn with_compensation(mut self, compensation: Compensation) -> Self {
        self.wage_min = compensation.min;
        self.wage_max = compensation.max;
        self.pay_period = compensation.period;
        self
    }

    pub fn has_title(&self) -> bool {
        !self.title.is_empty()
    }
}

/// A draft with its industry and a monthly-comparable wage attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassifiedListing {
    #[serde(flatten)]
    pub draft: ListingDraft,
    pub industry: Industry,
    pub normalized_wage_min: u64,
    pub normalized_wage_max: u64,
    pub normalized_pay_period: PayPeriod,
}

impl ClassifiedListing {
    pub fn from_draft(draft: ListingDraft) -> Self {
        let industry = classify(&draft.title);
        let normalized = draft.compensation().fold_annual();
        Self {
            draft,
            industry,
            normalized_wage_min: normalized.min,
            normalized_wage_max: normalized.max,
            normalized_pay_period: normalized.period,
        }
    }

    pub fn title(&self) -> &str {
        &self.draft.title
    }

    pub fn company(&self) -> &str {
        &self.draft.company
    }
}

/// A stored listing. Never mutated after insertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedListing {
    pub id: Uuid,
    pub title: String,
    pub company: String,
    pub location: String,
    pub wage_min: u64,
    pub wage_max: u64,
    pub pay_period: PayPeriod,
    pub normalized_wage_min: u64,
    pub normalized_wage_max: u64,
    pub normalized_pay_period: PayPeriod,
    pub industry: Industry,
    pub employment_type: Option<String>,
    pub source_url: Option<String>,
    pub source: ListingSource,
    pub created_at: DateTime<Utc>,
}

impl PersistedListing {
    pub fn from_classified(listing: &ClassifiedListing, id: Uuid, created_at: DateTime<Utc>) -> Self {
        let draft = &listing.draft;
        Self {
            id,
            title: draft.title.clone(),
            company: draft.company.clone(),
            location: draft.location.clone(),
            wage_min: draft.wage_min,
            wage_max: draft.wage_max,
            pay_period: draft.pay_period,
            normalized_wage_min: listing.normalized_wage_min,
            normalized_wage_max: listing.normalized_wage_max,
            normalized_pay_period: listing.normalized_pay_period,
            industry: listing.industry,
            employment_type: draft.employment_type.clone(),
            source_url: draft.source_url.clone(),
            source: draft.source,
            created_at,
        }
    }
}

/// Criteria for querying stored listings. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingFilter {
    /// Substring of title or company.
    pub keyword: Option<String>,
    /// Lower bound on `wage_min`.
    pub wage_min: Option<u64>,
    /// Upper bound on `wage_min`.
    pub wage_max: Option<u64>,
    pub industry: Option<Industry>,
    /// Substring of location.
    pub location: Option<String>,
    pub pay_period: Option<PayPeriod>,
    pub limit: Option<usize>,
}

impl ListingFilter {
    /// In-memory equivalent of the store's query predicate.
    pub fn matches(&self, listing: &PersistedListing) -> bool {
        if let Some(keyword) = &self.keyword
            && !listing.title.contains(keyword.as_str())
            && !listing.company.contains(keyword.as_str())
        {
            return false;
        }
        if self.wage_min.is_some_and(|min| listing.wage_min < min) {
            return false;
        }
        if self.wage_max.is_some_and(|max| listing.wage_min > max) {
            return false;
        }
        if self.industry.is_some_and(|i| listing.industry != i) {
            return false;
        }
        if let Some(location) = &self.location
            && !listing.location.contains(location.as_str())
        {
            return false;
        }
        if self.pay_period.is_some_and(|p| listing.pay_period != p) {
            return false;
        }
        true
    }
}

/// Aggregate figures over a set of listings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingStats {
    pub total: usize,
    pub monthly_count: usize,
    pub hourly_count: usize,
    pub avg_monthly_wage: u64,
    pub avg_hourly_wage: u64,
}

impl ListingStats {
    /// Averages use `normalized_wage_min` grouped by normalized period,
    /// ignoring unquantified listings.
    pub fn from_listings(listings: &[PersistedListing]) -> Self {
        let monthly: Vec<u64> = wages_for(listings, PayPeriod::Monthly);
        let hourly: Vec<u64> = wages_for(listings, PayPeriod::Hourly);

        Self {
            total: listings.len(),
            monthly_count: monthly.len(),
            hourly_count: hourly.len(),
            avg_monthly_wage: average(&monthly),
            avg_hourly_wage: average(&hourly),
        }
    }
}

/// Listing count and average monthly wage for one industry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndustryStat {
    pub industry: Industry,
    pub count: usize,
    /// Over listings with a quantified monthly wage; 0 when there are none.
    pub avg_monthly_wage: u64,
}

/// Listing count for one prefecture, or the raw location when none is named.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefectureStat {
    pub prefecture: String,
    pub count: usize,
}

/// Number of prefecture rows `by_prefecture` reports by default.
pub const TOP_PREFECTURES: usize = 10;

impl ListingStats {
    /// One row per industry present, most listings first.
    pub fn by_industry(listings: &[PersistedListing]) -> Vec<IndustryStat> {
        let mut groups: Vec<(Industry, Vec<&PersistedListing>)> = Vec::new();
        for listing in listings {
            match groups.iter_mut().find(|(i, _)| *i == listing.industry) {
                Some((_, members)) => members.push(listing),
                None => groups.push((listing.industry, vec![listing])),
            }
        }

        let mut stats: Vec<IndustryStat> = groups
            .into_iter()
            .map(|(industry, members)| {
                let monthly: Vec<u64> = members
                    .iter()
                    .filter(|l| {
                        l.normalized_pay_period == PayPeriod::Monthly && l.normalized_wage_min > 0
                    })
                    .map(|l| l.normalized_wage_min)
                    .collect();
                IndustryStat {
                    industry,
                    count: members.len(),
                    avg_monthly_wage: average(&monthly),
                }
            })
            .collect();
        stats.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.industry.as_str().cmp(b.industry.as_str()))
        });
        stats
    }

    /// The `limit` most common prefectures, most listings first. Listings
    /// without a location are not counted.
    pub fn by_prefecture(listings: &[PersistedListing], limit: usize) -> Vec<PrefectureStat> {
        let mut stats: Vec<PrefectureStat> = Vec::new();
        for location in listings.iter().map(|l| l.location.trim()) {
            if location.is_empty() {
                continue;
            }
            let key = prefecture_in(location).unwrap_or(location);
            match stats.iter_mut().find(|s| s.prefecture == key) {
                Some(stat) => stat.count += 1,
                None => stats.push(PrefectureStat {
                    prefecture: key.to_string(),
                    count: 1,
                }),
            }
        }

        stats.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.prefecture.cmp(&b.prefecture)));
        stats.truncate(limit);
        stats
    }
}

fn wages_for(listings: &[PersistedListing], period: PayPeriod) -> Vec<u64> {
    listings
        .iter()
        .filter(|l| l.normalized_pay_period == period && l.normalized_wage_min > 0)
        .map(|l| l.normalized_wage_min)
        .collect()
}

fn average(values: &[u64]) -> u64 {
    if values.is_empty() {
        return 0;
    }
    values.iter().sum::<u64>() / values.len() as u64
}

/// Outcome of one finished crawl run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub success: bool,
    pub source: ListingSource,
    /// Area/keyword or region the run covered.
    pub scope: String,
    pub max_pages: u32,
    pub force: bool,
    pub pages: u32,
    pub inserted: u64,
    pub skipped: u64,
    /// Set for region fan-out runs.
    pub regions_completed: Option<u32>,
    pub error: Option<String>,
    pub finished_at: DateTime<Utc>,
}

/// Process-wide crawl state, replaced as a whole on every transition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlRun {
    pub is_running: bool,
    pub last_result: Option<RunSummary>,
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn persisted(title: &str, company: &str, wage: u64, period: PayPeriod) -> PersistedListing {
        let draft = ListingDraft {
            company: company.to_string(),
            location: "大阪市北区".to_string(),
            ..ListingDraft::new(ListingSource::Hellowork, title)
        }
        .with_compensation(Compensation {
            min: wage,
            max: wage,
            period,
        });
        PersistedListing::from_classified(
            &ClassifiedListing::from_draft(draft),
            Uuid::new_v4(),
            Utc::now(),
        )
    }

    #[test]
    fn test_truncate_title_by_chars() {
        let long = "あ".repeat(150);
        let t = truncate_title(&long);
        assert_eq!(t.chars().count(), MAX_TITLE_CHARS);
        assert_eq!(truncate_title("  営業  "), "営業");
    }

    #[test]
    fn test_classified_folds_annual_but_draft_keeps_it() {
        let draft = ListingDraft::new(ListingSource::Indeed, "AIエンジニア").with_compensation(
            Compensation {
                min: 6_000_000,
                max: 8_400_000,
                period: PayPeriod::Annual,
            },
        );
        let listing = ClassifiedListing::from_draft(draft);

        assert_eq!(listing.industry, Industry::ItEngineering);
        assert_eq!(listing.draft.pay_period, PayPeriod::Annual);
        assert_eq!(listing.normalized_pay_period, PayPeriod::Monthly);
        assert_eq!(listing.normalized_wage_min, 500_000);
        assert_eq!(listing.normalized_wage_max, 700_000);
    }

    #[test]
    fn test_filter_matches() {
        let listing = persisted("介護スタッフ", "ケア株式会社", 1_200, PayPeriod::Hourly);

        assert!(ListingFilter::default().matches(&listing));
        assert!(
            ListingFilter {
                keyword: Some("ケア".into()),
                ..Default::default()
            }
            .matches(&listing)
        );
        assert!(
            !ListingFilter {
                wage_min: Some(1_500),
                ..Default::default()
            }
            .matches(&listing)
        );
        assert!(
            ListingFilter {
                wage_max: Some(1_500),
                industry: Some(Industry::MedicalCare),
                location: Some("大阪".into()),
                ..Default::default()
            }
            .matches(&listing)
        );
        assert!(
            !ListingFilter {
                pay_period: Some(PayPeriod::Monthly),
                ..Default::default()
            }
            .matches(&listing)
        );
    }

    #[test]
    fn test_stats_from_listings() {
        let listings = vec![
            persisted("a", "x", 200_000, PayPeriod::Monthly),
            persisted("b", "x", 300_001, PayPeriod::Monthly),
            persisted("c", "x", 1_000, PayPeriod::Hourly),
            persisted("d", "x", 6_000_000, PayPeriod::Annual),
            persisted("e", "x", 0, PayPeriod::Unknown),
        ];
        let stats = ListingStats::from_listings(&listings);

        assert_eq!(stats.total, 5);
        assert_eq!(stats.monthly_count, 3);
        assert_eq!(stats.hourly_count, 1);
        assert_eq!(stats.avg_monthly_wage, (200_000 + 300_001 + 500_000) / 3);
        assert_eq!(stats.avg_hourly_wage, 1_000);
    }

    #[test]
    fn test_stats_by_industry() {
        let listings = vec![
            persisted("看護師", "A病院", 300_000, PayPeriod::Monthly),
            persisted("介護職員", "B園", 200_000, PayPeriod::Monthly),
            persisted("看護助手", "C病院", 1_200, PayPeriod::Hourly),
            persisted("営業", "D社", 250_000, PayPeriod::Monthly),
        ];
        let stats = ListingStats::by_industry(&listings);

        assert_eq!(stats.len(), 2);
        let first = &stats[0];
        assert_eq!(first.industry, listings[0].industry);
        assert_eq!(first.count, 3);
        assert_eq!(first.avg_monthly_wage, 250_000);
        assert_eq!(stats[1].count, 1);
        assert_eq!(stats[1].avg_monthly_wage, 250_000);
        assert!(ListingStats::by_industry(&[]).is_empty());
    }

    #[test]
    fn test_stats_by_prefecture_groups_and_limits() {
        let at = |location: &str| PersistedListing {
            location: location.to_string(),
            ..persisted("事務", "x", 200_000, PayPeriod::Monthly)
        };
        let listings = vec![
            at("大阪府大阪市北区"),
            at("大阪市中央区"),
            at("東京都新宿区"),
            at("京都市下京区"),
            at("在宅勤務"),
            at(""),
        ];

        let stats = ListingStats::by_prefecture(&listings, TOP_PREFECTURES);
        assert_eq!(
            stats[0],
            PrefectureStat {
                prefecture: "大阪府".into(),
                count: 2
            }
        );
        assert_eq!(stats.len(), 4);
        assert!(stats.iter().any(|s| s.prefecture == "京都府" && s.count == 1));
        assert!(stats.iter().any(|s| s.prefecture == "東京都" && s.count == 1));
        assert!(stats.iter().any(|s| s.prefecture == "在宅勤務"));

        assert_eq!(ListingStats::by_prefecture(&listings, 1).len(), 1);
    }

    #[test]
    fn test_stats_empty() {
        assert_eq!(ListingStats::from_listings(&[]), ListingStats::default());
    }

    #[test]
    fn test_crawl_run_serializes() {
        let json = serde_json::to_value(CrawlRun::default()).unwrap();
        assert_eq!(json["is_running"], false);
        assert!(json["last_result"].is_null());
    }
}
