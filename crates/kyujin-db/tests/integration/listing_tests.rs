use kyujin_core::gate::{PersistOutcome, PersistenceGate};
use kyujin_core::industry::Industry;
use kyujin_core::models::{ClassifiedListing, ListingDraft, ListingFilter, ListingStats};
use kyujin_core::source::ListingSource;
use kyujin_core::traits::ListingStore;
use kyujin_core::wage::{Compensation, PayPeriod};
use kyujin_db::ListingRepository;

use crate::integration::common::setup_test_db;

fn listing(title: &str, company: &str, min: u64, max: u64, period: PayPeriod) -> ClassifiedListing {
    let draft = ListingDraft {
        company: company.into(),
        location: "東京都新宿区".into(),
        ..ListingDraft::new(ListingSource::Hellowork, title)
    }
    .with_compensation(Compensation { min, max, period });
    ClassifiedListing::from_draft(draft)
}

#[tokio::test]
async fn insert_and_query_roundtrip() {
    let (pool, _container) = setup_test_db().await;
    let repo = ListingRepository::new(pool);
    repo.health_check().await.unwrap();

    let mut classified = listing("Webエンジニア", "株式会社テスト", 3_600_000, 6_000_000, PayPeriod::Annual);
    classified.draft.employment_type = Some("正社員".into());
    classified.draft.source_url = Some("https://www.hellowork.mhlw.go.jp/kensaku/x".into());

    let id = repo.insert(&classified).await.unwrap();
    assert!(!id.is_nil());

    let stored = repo.query_all(&ListingFilter::default()).await.unwrap();
    assert_eq!(stored.len(), 1);
    let row = &stored[0];
    assert_eq!(row.id, id);
    assert_eq!(row.title, "Webエンジニア");
    assert_eq!(row.company, "株式会社テスト");
    assert_eq!(row.pay_period, PayPeriod::Annual);
    assert_eq!(row.wage_min, 3_600_000);
    assert_eq!(row.normalized_pay_period, PayPeriod::Monthly);
    assert_eq!(row.normalized_wage_min, 300_000);
    assert_eq!(row.normalized_wage_max, 500_000);
    assert_eq!(row.industry, Industry::ItEngineering);
    assert_eq!(row.employment_type.as_deref(), Some("正社員"));
    assert_eq!(row.source, ListingSource::Hellowork);
}

#[tokio::test]
async fn exists_matches_exact_pair_only() {
    let (pool, _container) = setup_test_db().await;
    let repo = ListingRepository::new(pool);

    repo.insert(&listing("介護職員", "ケア株式会社", 0, 0, PayPeriod::Unknown))
        .await
        .unwrap();

    assert!(repo.exists("介護職員", "ケア株式会社").await.unwrap());
    assert!(!repo.exists("介護職員", "ケア株式会社 本社").await.unwrap());
    assert!(!repo.exists("介護職員（夜勤）", "ケア株式会社").await.unwrap());
}

#[tokio::test]
async fn gate_skips_duplicates_unless_forced() {
    let (pool, _container) = setup_test_db().await;
    let gate = PersistenceGate::new(ListingRepository::new(pool.clone()));
    let item = listing("倉庫スタッフ", "物流株式会社", 1_200, 1_500, PayPeriod::Hourly);

    assert!(matches!(
        gate.persist(&item, false).await.unwrap(),
        PersistOutcome::Inserted(_)
    ));
    assert_eq!(
        gate.persist(&item, false).await.unwrap(),
        PersistOutcome::SkippedDuplicate
    );
    assert!(matches!(
        gate.persist(&item, true).await.unwrap(),
        PersistOutcome::Inserted(_)
    ));

    let repo = ListingRepository::new(pool);
    assert_eq!(repo.query_all(&ListingFilter::default()).await.unwrap().len(), 2);
}

#[tokio::test]
async fn query_filters_and_orders_newest_first() {
    let (pool, _container) = setup_test_db().await;
    let repo = ListingRepository::new(pool);

    for item in [
        listing("看護師", "中央病院", 280_000, 350_000, PayPeriod::Monthly),
        listing("ホールスタッフ", "レストラン株式会社", 1_100, 1_300, PayPeriod::Hourly),
        listing("営業職", "中央商事", 220_000, 260_000, PayPeriod::Monthly),
    ] {
        repo.insert(&item).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    let all = repo.query_all(&ListingFilter::default()).await.unwrap();
    let titles: Vec<&str> = all.iter().map(|l| l.title.as_str()).collect();
    assert_eq!(titles, vec!["営業職", "ホールスタッフ", "看護師"]);

    let by_keyword = repo
        .query_all(&ListingFilter {
            keyword: Some("中央".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(by_keyword.len(), 2);

    let by_wage = repo
        .query_all(&ListingFilter {
            wage_min: Some(200_000),
            wage_max: Some(250_000),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(by_wage.len(), 1);
    assert_eq!(by_wage[0].title, "営業職");

    let by_industry = repo
        .query_all(&ListingFilter {
            industry: Some(Industry::MedicalCare),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(by_industry.len(), 1);
    assert_eq!(by_industry[0].title, "看護師");

    let hourly = repo
        .query_all(&ListingFilter {
            pay_period: Some(PayPeriod::Hourly),
            location: Some("新宿".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(hourly.len(), 1);

    let limited = repo
        .query_all(&ListingFilter {
            limit: Some(1),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0].title, "営業職");

    let stats = ListingStats::from_listings(&all);
    assert_eq!(stats.total, 3);
    assert_eq!(stats.monthly_count, 2);
    assert_eq!(stats.hourly_count, 1);
    assert_eq!(stats.avg_monthly_wage, 250_000);
    assert_eq!(stats.avg_hourly_wage, 1_100);
}
