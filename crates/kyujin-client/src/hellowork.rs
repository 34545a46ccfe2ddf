use std::sync::LazyLock;

use kyujin_core::error::AppError;
use kyujin_core::models::{ListingDraft, truncate_title};
use kyujin_core::source::ListingSource;
use kyujin_core::traits::{ListingExtractor, PageExtraction};
use kyujin_core::wage;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::dom::{compact_text, full_text, resolve_href, select_first};

const BASE_URL: &str = "https://www.hellowork.mhlw.go.jp/kensaku/";

static LISTING: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("table.kyujin").expect("BUG: hardcoded CSS selector 'table.kyujin' is invalid")
});
static HEAD_ROW: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("tr.kyujin_head").expect("BUG: hardcoded CSS selector 'tr.kyujin_head' is invalid")
});
static BODY_ROW: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("tr.kyujin_body").expect("BUG: hardcoded CSS selector 'tr.kyujin_body' is invalid")
});
static FIELD_ROW: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("tr.border_new").expect("BUG: hardcoded CSS selector 'tr.border_new' is invalid")
});
static ANCHOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a").expect("BUG: hardcoded CSS selector 'a' is invalid"));
static CELL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td").expect("BUG: hardcoded CSS selector 'td' is invalid"));

/// Extractor for the public employment-service search results: one
/// `table.kyujin` per listing, a head row with the title and a body row
/// holding a nested label/value table.
#[derive(Debug, Clone)]
pub struct HelloWorkExtractor {
    base: Url,
}

impl HelloWorkExtractor {
    pub fn new() -> Result<Self, AppError> {
        let base = Url::parse(BASE_URL)
            .map_err(|e| AppError::ConfigError(format!("Invalid base URL {BASE_URL}: {e}")))?;
        Ok(Self { base })
    }

    /// Parse one `table.kyujin` element.
    pub fn parse_element(&self, element: ElementRef<'_>) -> Result<ListingDraft, AppError> {
        let head = select_first(element, &HEAD_ROW);
        let body = select_first(element, &BODY_ROW);
        if head.is_none() && body.is_none() {
            return Err(AppError::ParseError(
                "listing table has neither head nor body row".into(),
            ));
        }

        let mut title = String::new();
        let mut source_url = None;
        if let Some(head) = head {
            match select_first(head, &ANCHOR) {
                Some(link) => {
                    title = compact_text(link);
                    source_url = link
                        .value()
                        .attr("href")
                        .and_then(|href| match resolve_href(&self.base, href) {
                            Ok(url) => url,
                            Err(e) => {
                                tracing::warn!(%href, error = %e, "Ignoring unresolvable listing link");
                                None
                            }
                        });
                }
                None => {
                    if let Some(cell) = select_first(head, &CELL) {
                        title = compact_text(cell);
                    }
                }
            }
        }

        let mut company = String::new();
        let mut location = String::new();
        let mut wage_text = String::new();
        if let Some(body) = body {
            for row in body.select(&FIELD_ROW) {
                let mut cells = row.select(&CELL);
                let (Some(label), Some(value)) = (cells.next(), cells.next()) else {
                    continue;
                };
                let label = compact_text(label);
                let value = compact_text(value);

                if label.contains("事業所名") {
                    company = value;
                } else if label.contains("就業場所") {
                    location = value;
                } else if label.contains("賃金") {
                    wage_text = value;
                } else if label.contains("仕事の内容") && title.is_empty() {
                    title = value;
                }
            }
        }

        let compensation = wage::normalize(&wage_text, &full_text(element));

        Ok(ListingDraft {
            title: truncate_title(&title),
            company,
            location,
            employment_type: None,
            source_url,
            ..ListingDraft::new(ListingSource::Hellowork, "")
        }
        .with_compensation(compensation))
    }
}

impl ListingExtractor for HelloWorkExtractor {
    fn source(&self) -> ListingSource {
        ListingSource::Hellowork
    }

    fn extract_page(&self, html: &str) -> PageExtraction {
        let document = Html::parse_document(html);
        let mut page = PageExtraction::default();

        for element in document.select(&LISTING) {
            page.element_count += 1;
            match self.parse_element(element) {
                Ok(draft) => page.drafts.push(draft),
                Err(e) => {
                    tracing::warn!(index = page.element_count, error = %e, "Skipping malformed listing");
                    page.failures += 1;
                }
            }
        }

        page
    }
}

#[cfg(test)]
mod tests {
    use kyujin_core::wage::PayPeriod;

    use super::*;

    fn listing_table(title_cell: &str, rows: &[(&str, &str)]) -> String {
        let rows: String = rows
            .iter()
            .map(|(label, value)| {
                format!(
                    r#"<tr class="border_new"><td class="fb">{label}</td><td>{value}</td></tr>"#
                )
            })
            .collect();
        format!(
            r#"
            <table class="kyujin">
                <tr class="kyujin_head"><td>{title_cell}</td></tr>
                <tr class="kyujin_body">
                    <td><table class="noborder">{rows}</table></td>
                </tr>
            </table>"#
        )
    }

    fn standard(wage_text: &str) -> String {
        listing_table(
            r##"<a href="#">AIアプリ開発エンジニア</a>"##,
            &[
                ("事業所名", "株式会社テストテック"),
                ("就業場所", "大阪市北区"),
                ("賃金（手当等を含む）", wage_text),
            ],
        )
    }

    fn extract_one(html: &str) -> ListingDraft {
        let page = HelloWorkExtractor::new().unwrap().extract_page(html);
        assert_eq!(page.element_count, 1);
        page.drafts.into_iter().next().unwrap()
    }

    #[test]
    fn test_parse_basic_fields() {
        let draft = extract_one(&standard("250,000円〜500,000円"));

        assert_eq!(draft.title, "AIアプリ開発エンジニア");
        assert_eq!(draft.company, "株式会社テストテック");
        assert_eq!(draft.location, "大阪市北区");
        assert_eq!(draft.wage_min, 250_000);
        assert_eq!(draft.wage_max, 500_000);
        assert_eq!(draft.pay_period, PayPeriod::Monthly);
        assert_eq!(draft.source, ListingSource::Hellowork);
        assert_eq!(draft.source_url, None);
    }

    #[test]
    fn test_parse_hourly() {
        let draft = extract_one(&standard("時給 1,200円〜1,500円"));
        assert_eq!(draft.pay_period, PayPeriod::Hourly);
        assert_eq!(draft.wage_min, 1_200);
        assert_eq!(draft.wage_max, 1_500);
    }

    #[test]
    fn test_parse_monthly_open_ended() {
        let draft = extract_one(&standard("月給 200,000円〜"));
        assert_eq!(draft.pay_period, PayPeriod::Monthly);
        assert_eq!(draft.wage_min, 200_000);
        assert_eq!(draft.wage_max, 200_000);
    }

    #[test]
    fn test_annual_kept_on_draft() {
        let draft = extract_one(&standard("年俸 4,800,000円"));
        assert_eq!(draft.pay_period, PayPeriod::Annual);
        assert_eq!(draft.wage_min, 4_800_000);
    }

    #[test]
    fn test_title_falls_back_to_first_cell() {
        let html = listing_table("製造スタッフ", &[("事業所名", "A社")]);
        assert_eq!(extract_one(&html).title, "製造スタッフ");
    }

    #[test]
    fn test_title_falls_back_to_job_description() {
        let description = "部品の組立及び検品作業".repeat(20);
        let html = listing_table("", &[("事業所名", "A社"), ("仕事の内容", &description)]);
        let draft = extract_one(&html);
        assert_eq!(draft.title.chars().count(), 100);
        assert!(draft.title.starts_with("部品の組立"));
    }

    #[test]
    fn test_wage_amount_falls_back_to_full_text() {
        let html = listing_table(
            "<a>倉庫作業</a>",
            &[("賃金（手当等を含む）", "応相談"), ("備考", "日給 9,000円")],
        );
        let draft = extract_one(&html);
        assert_eq!(draft.wage_min, 9_000);
        assert_eq!(draft.pay_period, PayPeriod::Daily);
    }

    #[test]
    fn test_detail_link_is_resolved() {
        let html = listing_table(
            r#"<a href="GECA110020.do?kJNo=1234">介護職員</a>"#,
            &[("事業所名", "ケア株式会社")],
        );
        assert_eq!(
            extract_one(&html).source_url.as_deref(),
            Some("https://www.hellowork.mhlw.go.jp/kensaku/GECA110020.do?kJNo=1234")
        );
    }

    #[test]
    fn test_page_in_document_order_with_malformed_element() {
        let html = format!(
            "{}{}{}",
            listing_table("<a>一件目</a>", &[("事業所名", "A社")]),
            r#"<table class="kyujin"><tr><td>広告</td></tr></table>"#,
            listing_table("<a>二件目</a>", &[("事業所名", "B社")]),
        );
        let page = HelloWorkExtractor::new().unwrap().extract_page(&html);

        assert_eq!(page.element_count, 3);
        assert_eq!(page.failures, 1);
        let titles: Vec<&str> = page.drafts.iter().map(|d| d.title.as_str()).collect();
        assert_eq!(titles, vec!["一件目", "二件目"]);
    }

    #[test]
    fn test_page_without_listings() {
        let page = HelloWorkExtractor::new()
            .unwrap()
            .extract_page("<html><body><p>該当する求人はありません</p></body></html>");
        assert_eq!(page.element_count, 0);
        assert!(page.drafts.is_empty());
    }
}
