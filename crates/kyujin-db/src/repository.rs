use chrono::{DateTime, Utc};
use kyujin_core::error::AppError;
use kyujin_core::models::{ClassifiedListing, ListingFilter, PersistedListing};
use kyujin_core::traits::ListingStore;
use sqlx::{PgPool, Pool, Postgres};
use uuid::Uuid;

/// Listing persistence in PostgreSQL. Insert and read only.
#[derive(Clone)]
pub struct ListingRepository {
    pool: Pool<Postgres>,
}

impl ListingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Whether a listing with exactly this title and company is stored.
    pub async fn exists(&self, title: &str, company: &str) -> Result<bool, AppError> {
        let row: (bool,) = sqlx::query_as(
            r#"SELECT EXISTS(SELECT 1 FROM listings WHERE title = $1 AND company = $2)"#,
        )
        .bind(title)
        .bind(company)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(row.0)
    }

    /// Insert a classified listing. Returns the generated UUID.
    pub async fn insert(&self, listing: &ClassifiedListing) -> Result<Uuid, AppError> {
        let draft = &listing.draft;
        let row: (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO listings (
                title, company, location, wage_min, wage_max, pay_period,
                normalized_wage_min, normalized_wage_max, normalized_pay_period,
                industry, employment_type, source_url, source
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING id
            "#,
        )
        .bind(&draft.title)
        .bind(&draft.company)
        .bind(&draft.location)
        .bind(to_db_amount(draft.wage_min)?)
        .bind(to_db_amount(draft.wage_max)?)
        .bind(draft.pay_period.as_str())
        .bind(to_db_amount(listing.normalized_wage_min)?)
        .bind(to_db_amount(listing.normalized_wage_max)?)
        .bind(listing.normalized_pay_period.as_str())
        .bind(listing.industry.as_str())
        .bind(&draft.employment_type)
        .bind(&draft.source_url)
        .bind(draft.source.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        tracing::debug!(id = %row.0, title = %draft.title, "Listing inserted");
        Ok(row.0)
    }

    /// Listings matching `filter`, newest first.
    pub async fn query_all(&self, filter: &ListingFilter) -> Result<Vec<PersistedListing>, AppError> {
        let rows = sqlx::query_as::<_, ListingRow>(
            r#"
            SELECT id, title, company, location, wage_min, wage_max, pay_period,
                   normalized_wage_min, normalized_wage_max, normalized_pay_period,
                   industry, employment_type, source_url, source, created_at
            FROM listings
            WHERE ($1::varchar IS NULL OR strpos(title, $1) > 0 OR strpos(company, $1) > 0)
              AND ($2::bigint IS NULL OR wage_min >= $2)
              AND ($3::bigint IS NULL OR wage_min <= $3)
              AND ($4::varchar IS NULL OR industry = $4)
              AND ($5::varchar IS NULL OR strpos(location, $5) > 0)
              AND ($6::varchar IS NULL OR pay_period = $6)
            ORDER BY created_at DESC
            LIMIT $7
            "#,
        )
        .bind(&filter.keyword)
        .bind(filter.wage_min.map(to_db_amount).transpose()?)
        .bind(filter.wage_max.map(to_db_amount).transpose()?)
        .bind(filter.industry.map(|i| i.as_str()))
        .bind(&filter.location)
        .bind(filter.pay_period.map(|p| p.as_str()))
        .bind(filter.limit.map(|l| l as i64))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        rows.into_iter().map(PersistedListing::try_from).collect()
    }

    /// Check database connectivity.
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;
        Ok(())
    }
}

fn to_db_amount(value: u64) -> Result<i64, AppError> {
    i64::try_from(value)
        .map_err(|_| AppError::DatabaseError(format!("Wage amount {value} out of range")))
}

fn from_db_amount(value: i64, column: &str) -> Result<u64, AppError> {
    u64::try_from(value)
        .map_err(|_| AppError::DatabaseError(format!("Negative {column} in stored listing: {value}")))
}

// -- Internal row type for sqlx deserialization --

#[derive(sqlx::FromRow)]
struct ListingRow {
    id: Uuid,
    title: String,
    company: String,
    location: String,
    wage_min: i64,
    wage_max: i64,
    pay_period: String,
    normalized_wage_min: i64,
    normalized_wage_max: i64,
    normalized_pay_period: String,
    industry: String,
    employment_type: Option<String>,
    source_url: Option<String>,
    source: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<ListingRow> for PersistedListing {
    type Error = AppError;

    fn try_from(row: ListingRow) -> Result<Self, AppError> {
        let decode = |e: String| AppError::DatabaseError(format!("Listing {}: {e}", row.id));
        Ok(PersistedListing {
            id: row.id,
            wage_min: from_db_amount(row.wage_min, "wage_min")?,
            wage_max: from_db_amount(row.wage_max, "wage_max")?,
            pay_period: row.pay_period.parse().map_err(decode)?,
            normalized_wage_min: from_db_amount(row.normalized_wage_min, "normalized_wage_min")?,
            normalized_wage_max: from_db_amount(row.normalized_wage_max, "normalized_wage_max")?,
            normalized_pay_period: row.normalized_pay_period.parse().map_err(decode)?,
            industry: row.industry.parse().map_err(decode)?,
            source: row.source.parse().map_err(decode)?,
            title: row.title,
            company: row.company,
            location: row.location,
            employment_type: row.employment_type,
            source_url: row.source_url,
            created_at: row.created_at,
        })
    }
}

// -- Trait implementation --

impl ListingStore for ListingRepository {
    async fn exists(&self, title: &str, company: &str) -> Result<bool, AppError> {
        ListingRepository::exists(self, title, company).await
    }

    async fn insert(&self, listing: &ClassifiedListing) -> Result<Uuid, AppError> {
        ListingRepository::insert(self, listing).await
    }

    async fn query_all(&self, filter: &ListingFilter) -> Result<Vec<PersistedListing>, AppError> {
        ListingRepository::query_all(self, filter).await
    }
}
