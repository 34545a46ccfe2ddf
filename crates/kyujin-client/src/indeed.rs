use std::sync::LazyLock;

use kyujin_core::error::AppError;
use kyujin_core::models::{ListingDraft, truncate_title};
use kyujin_core::source::ListingSource;
use kyujin_core::traits::{ListingExtractor, PageExtraction};
use kyujin_core::wage;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::dom::{compact_text, full_text, has_class, resolve_href, select_first, select_text};

const BASE_URL: &str = "https://jp.indeed.com";

/// Decoration some titles carry for freshly posted listings.
const NEW_POSTING_PREFIX: &str = "新着";

const SALARY_CLASS: &str = "salary-snippet-container";

/// Employment types recognised among a card's attribute snippets.
const EMPLOYMENT_TYPES: &[&str] = &["正社員", "アルバイト・パート", "派遣社員", "契約社員"];

static CARD: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("div.job_seen_beacon")
        .expect("BUG: hardcoded CSS selector 'div.job_seen_beacon' is invalid")
});
static CARD_OUTLINE: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("div[class*='cardOutline']")
        .expect("BUG: hardcoded CSS selector for card outlines is invalid")
});
static TITLE: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("h2.jobTitle").expect("BUG: hardcoded CSS selector 'h2.jobTitle' is invalid")
});
static TITLE_SPAN: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("span[title]").expect("BUG: hardcoded CSS selector 'span[title]' is invalid")
});
static SNIPPET: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("div.job-snippet")
        .expect("BUG: hardcoded CSS selector 'div.job-snippet' is invalid")
});
static ANCHOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a").expect("BUG: hardcoded CSS selector 'a' is invalid"));
static COMPANY: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("span[data-testid='company-name']")
        .expect("BUG: hardcoded CSS selector for company name is invalid")
});
static LOCATION: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("div[data-testid='text-location']")
        .expect("BUG: hardcoded CSS selector for text location is invalid")
});
static LOCATION_ICON: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("div[data-testid='icon-location']")
        .expect("BUG: hardcoded CSS selector for icon location is invalid")
});
static SALARY: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("li.salary-snippet-container")
        .expect("BUG: hardcoded CSS selector for salary snippet is invalid")
});
static ATTRIBUTE: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("li[data-testid='attribute_snippet_testid']")
        .expect("BUG: hardcoded CSS selector for attribute snippets is invalid")
});

/// Extractor for card-layout search results.
#[derive(Debug, Clone)]
pub struct IndeedExtractor {
    base: Url,
}

impl IndeedExtractor {
    pub fn new() -> Result<Self, AppError> {
        let base = Url::parse(BASE_URL)
            .map_err(|e| AppError::ConfigError(format!("Invalid base URL {BASE_URL}: {e}")))?;
        Ok(Self { base })
    }

    /// Parse one result card.
    ///
    /// The title comes from the heading, else the `title` attribute of a
    /// title span, else the job snippet. A card with neither a title heading
    /// nor a company name is not a listing (ads, survey widgets) and fails.
    pub fn parse_card(&self, card: ElementRef<'_>) -> Result<ListingDraft, AppError> {
        let heading = select_first(card, &TITLE);
        let company = select_text(card, &COMPANY);
        if heading.is_none() && company.is_none() {
            return Err(AppError::ParseError(
                "card has neither title nor company".into(),
            ));
        }

        let mut title = card_title(card, heading);
        if let Some(rest) = title.strip_prefix(NEW_POSTING_PREFIX) {
            title = rest.trim().to_string();
        }

        let source_url = heading
            .and_then(|h| select_first(h, &ANCHOR))
            .and_then(|a| a.value().attr("href"))
            .and_then(|href| match resolve_href(&self.base, href) {
                Ok(url) => url,
                Err(e) => {
                    tracing::warn!(%href, error = %e, "Ignoring unresolvable listing link");
                    None
                }
            });

        let location = select_text(card, &LOCATION)
            .or_else(|| select_text(card, &LOCATION_ICON))
            .unwrap_or_default();

        let salary_text = select_text(card, &SALARY).unwrap_or_default();
        let compensation = wage::normalize(&salary_text, &full_text(card)).fold_annual();

        let employment_type = card
            .select(&ATTRIBUTE)
            .filter(|attr| !has_class(*attr, SALARY_CLASS))
            .map(compact_text)
            .find(|text| EMPLOYMENT_TYPES.contains(&text.as_str()));

        Ok(ListingDraft {
            title: truncate_title(&title),
            company: company.unwrap_or_default(),
            location,
            employment_type,
            source_url,
            ..ListingDraft::new(ListingSource::Indeed, "")
        }
        .with_compensation(compensation))
    }
}

fn card_title(card: ElementRef<'_>, heading: Option<ElementRef<'_>>) -> String {
    heading
        .map(compact_text)
        .filter(|t| !t.is_empty())
        .or_else(|| {
            card.select(&TITLE_SPAN)
                .filter_map(|span| span.value().attr("title"))
                .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
                .find(|t| !t.is_empty())
        })
        .or_else(|| select_text(card, &SNIPPET))
        .unwrap_or_default()
}

impl ListingExtractor for IndeedExtractor {
    fn source(&self) -> ListingSource {
        ListingSource::Indeed
    }

    fn extract_page(&self, html: &str) -> PageExtraction {
        let document = Html::parse_document(html);
        let mut cards: Vec<ElementRef<'_>> = document.select(&CARD).collect();
        if cards.is_empty() {
            cards = document.select(&CARD_OUTLINE).collect();
        }

        let mut page = PageExtraction {
            element_count: cards.len(),
            ..Default::default()
        };
        for (index, card) in cards.into_iter().enumerate() {
            match self.parse_card(card) {
                Ok(draft) => page.drafts.push(draft),
                Err(e) => {
                    tracing::warn!(%index, error = %e, "Skipping malformed card");
                    page.failures += 1;
                }
            }
        }

        page
    }
}

#[cfg(test)]
mod tests {
    use kyujin_core::models::MAX_TITLE_CHARS;
    use kyujin_core::wage::PayPeriod;

    use super::*;

    fn card(title: &str, salary: Option<&str>, employment_type: &str) -> String {
        let salary = salary
            .map(|s| {
                format!(
                    r#"<li class="salary-snippet-container" data-testid="attribute_snippet_testid">{s}</li>"#
                )
            })
            .unwrap_or_default();
        format!(
            r##"
            <div class="job_seen_beacon">
                <h2 class="jobTitle"><a href="#">{title}</a></h2>
                <span data-testid="company-name">テスト株式会社</span>
                <div data-testid="text-location">東京都渋谷区</div>
                <ul>
                    {salary}
                    <li data-testid="attribute_snippet_testid">{employment_type}</li>
                </ul>
            </div>"##
        )
    }

    fn extract_one(html: &str) -> ListingDraft {
        let page = IndeedExtractor::new().unwrap().extract_page(html);
        assert_eq!(page.element_count, 1);
        page.drafts.into_iter().next().unwrap()
    }

    #[test]
    fn test_parse_basic_card() {
        let draft = extract_one(&card("テストエンジニア", Some("月給 25万円 ~ 30万円"), "正社員"));

        assert_eq!(draft.title, "テストエンジニア");
        assert_eq!(draft.company, "テスト株式会社");
        assert_eq!(draft.location, "東京都渋谷区");
        assert_eq!(draft.employment_type.as_deref(), Some("正社員"));
        assert_eq!(draft.source, ListingSource::Indeed);
        assert_eq!(draft.source_url, None);
    }

    #[test]
    fn test_monthly_man_yen() {
        let draft = extract_one(&card("営業", Some("月給 25万円 ~ 30万円"), "正社員"));
        assert_eq!(draft.pay_period, PayPeriod::Monthly);
        assert_eq!(draft.wage_min, 250_000);
        assert_eq!(draft.wage_max, 300_000);
    }

    #[test]
    fn test_hourly() {
        let draft = extract_one(&card("ホールスタッフ", Some("時給 1800円"), "アルバイト・パート"));
        assert_eq!(draft.pay_period, PayPeriod::Hourly);
        assert_eq!(draft.wage_min, 1_800);
        assert_eq!(draft.employment_type.as_deref(), Some("アルバイト・パート"));
    }

    #[test]
    fn test_annual_folded_to_monthly() {
        let draft = extract_one(&card("データサイエンティスト", Some("年収 500万円"), "正社員"));
        assert_eq!(draft.pay_period, PayPeriod::Monthly);
        assert_eq!(draft.wage_min, 416_666);
        assert_eq!(draft.wage_max, 416_666);
    }

    #[test]
    fn test_no_salary_is_unquantified() {
        let draft = extract_one(&card("看護師", None, "契約社員"));
        assert_eq!(draft.pay_period, PayPeriod::Unknown);
        assert_eq!((draft.wage_min, draft.wage_max), (0, 0));
        assert_eq!(draft.employment_type.as_deref(), Some("契約社員"));
    }

    #[test]
    fn test_unrecognised_employment_type_is_none() {
        let draft = extract_one(&card("看護師", Some("月給 30万円"), "シフト制"));
        assert_eq!(draft.employment_type, None);
    }

    #[test]
    fn test_new_posting_prefix_stripped() {
        let draft = extract_one(&card("新着 介護スタッフ", Some("時給 1,200円"), "正社員"));
        assert_eq!(draft.title, "介護スタッフ");
    }

    #[test]
    fn test_relative_url_resolved() {
        let html = r#"
            <div class="job_seen_beacon">
                <h2 class="jobTitle"><a href="/rc/clk?jk=0123abcd">倉庫スタッフ</a></h2>
                <span data-testid="company-name">物流株式会社</span>
                <div data-testid="icon-location">埼玉県川口市</div>
            </div>"#;
        let draft = extract_one(html);
        assert_eq!(
            draft.source_url.as_deref(),
            Some("https://jp.indeed.com/rc/clk?jk=0123abcd")
        );
        assert_eq!(draft.location, "埼玉県川口市");
    }

    #[test]
    fn test_card_without_title_keeps_empty_title() {
        let html = r#"
            <div class="job_seen_beacon">
                <span data-testid="company-name">無題株式会社</span>
            </div>"#;
        let draft = extract_one(html);
        assert_eq!(draft.title, "");
        assert!(!draft.has_title());
    }

    #[test]
    fn test_title_falls_back_to_title_span() {
        let html = r#"
            <div class="job_seen_beacon">
                <h2 class="jobTitle"><a href="/rc/clk?jk=1"></a></h2>
                <span title="倉庫内軽作業スタッフ"></span>
                <span data-testid="company-name">物流株式会社</span>
            </div>"#;
        let draft = extract_one(html);
        assert_eq!(draft.title, "倉庫内軽作業スタッフ");
        assert_eq!(draft.source_url.as_deref(), Some("https://jp.indeed.com/rc/clk?jk=1"));
    }

    #[test]
    fn test_title_falls_back_to_truncated_snippet() {
        let description = "未経験歓迎の一般事務".repeat(20);
        let html = format!(
            r#"<div class="job_seen_beacon">
                <span data-testid="company-name">事務株式会社</span>
                <div class="job-snippet"><ul><li>{description}</li></ul></div>
            </div>"#
        );
        let draft = extract_one(&html);
        assert_eq!(draft.title.chars().count(), MAX_TITLE_CHARS);
        assert!(draft.title.starts_with("未経験歓迎の一般事務"));
        assert_eq!(draft.company, "事務株式会社");
    }

    #[test]
    fn test_non_listing_card_fails_without_aborting_page() {
        let html = format!(
            r#"{}<div class="job_seen_beacon"><p>広告</p></div>{}"#,
            card("一件目", Some("時給 1,100円"), "正社員"),
            card("二件目", Some("時給 1,300円"), "正社員"),
        );
        let page = IndeedExtractor::new().unwrap().extract_page(&html);

        assert_eq!(page.element_count, 3);
        assert_eq!(page.failures, 1);
        let titles: Vec<&str> = page.drafts.iter().map(|d| d.title.as_str()).collect();
        assert_eq!(titles, vec!["一件目", "二件目"]);
    }

    #[test]
    fn test_card_outline_fallback() {
        let html = r#"
            <div class="css-1m4cuuf cardOutline tapItem">
                <h2 class="jobTitle"><a>清掃スタッフ</a></h2>
                <span data-testid="company-name">ビル管理株式会社</span>
            </div>"#;
        assert_eq!(extract_one(html).title, "清掃スタッフ");
    }

    #[test]
    fn test_empty_page() {
        let page = IndeedExtractor::new()
            .unwrap()
            .extract_page("<html><body></body></html>");
        assert_eq!(page.element_count, 0);
    }
}
