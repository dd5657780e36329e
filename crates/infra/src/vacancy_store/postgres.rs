//! Postgres-backed vacancy store.
//!
//! Expects the table from `migrations/0001_vacancies.sql`. Statements run on
//! whatever connection the caller's [`PgUnit`] provides, so the same queries
//! serve autocommit reads and serializable read-then-write units.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Row};
use tracing::{instrument, Span};

use jobboard_core::{CategoryId, CompanyId, VacancyId};
use jobboard_vacancies::{Vacancy, VacancyDraft};

use super::{StoreError, VacancyStore};
use crate::pagination::Bound;
use crate::tx::postgres::map_sqlx_error;
use crate::tx::{Beginner, PgBeginner, PgUnit, TxError};

const VACANCY_COLUMNS: &str = "id, company_id, category_id, title, description, created_at, updated_at, position";

#[derive(Debug, Clone)]
pub struct PostgresVacancyStore {
    beginner: PgBeginner,
}

impl PostgresVacancyStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            beginner: PgBeginner::new(pool),
        }
    }

    #[instrument(skip(self, unit), fields(vacancy_id = %id), err)]
    pub async fn find_vacancy(
        &self,
        unit: &mut PgUnit,
        id: VacancyId,
    ) -> Result<Option<Vacancy>, StoreError> {
        let conn = unit.connection().await?;
        let row = sqlx::query(&format!(
            "SELECT {VACANCY_COLUMNS} FROM vacancies WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("find_vacancy", e))?;

        row.map(|row| decode_row(&row)).transpose()
    }

    #[instrument(
        skip(self, unit, draft),
        fields(company_id = %company_id, vacancy_id = ?draft.id),
        err
    )]
    pub async fn upsert_vacancy(
        &self,
        unit: &mut PgUnit,
        company_id: CompanyId,
        draft: &VacancyDraft,
    ) -> Result<Vacancy, StoreError> {
        let id = draft.id.unwrap_or_default();
        let conn = unit.connection().await?;

        // position is BIGSERIAL and created_at is only written on insert, so
        // an update never moves a row in the listing order.
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO vacancies (
                id,
                company_id,
                category_id,
                title,
                description,
                created_at,
                updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            ON CONFLICT (id)
            DO UPDATE SET
                category_id = EXCLUDED.category_id,
                title = EXCLUDED.title,
                description = EXCLUDED.description,
                updated_at = EXCLUDED.updated_at
            RETURNING {VACANCY_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(company_id.as_uuid())
        .bind(draft.category_id.get())
        .bind(&draft.title)
        .bind(&draft.description)
        .bind(Utc::now())
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("upsert_vacancy", e))?;

        decode_row(&row)
    }

    #[instrument(
        skip(self, unit, categories),
        fields(categories = categories.len(), row_count = tracing::field::Empty),
        err
    )]
    pub async fn fetch_vacancy_page(
        &self,
        unit: &mut PgUnit,
        categories: &[CategoryId],
        bound: Bound,
        limit: u32,
    ) -> Result<Vec<Vacancy>, StoreError> {
        let category_ids: Vec<i64> = categories.iter().map(|c| c.get()).collect();
        let before = bound.before();
        let conn = unit.connection().await?;

        let rows = sqlx::query(&format!(
            r#"
            SELECT {VACANCY_COLUMNS}
            FROM vacancies
            WHERE (cardinality($1::bigint[]) = 0 OR category_id = ANY($1::bigint[]))
                AND ($2::timestamptz IS NULL OR (created_at, position) < ($2::timestamptz, $3::bigint))
            ORDER BY created_at DESC, position DESC
            LIMIT $4
            "#
        ))
        .bind(category_ids)
        .bind(before.map(|p| p.created_at))
        .bind(before.map(|p| p.sequence))
        .bind(i64::from(limit))
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("fetch_vacancy_page", e))?;

        Span::current().record("row_count", rows.len());

        rows.iter().map(decode_row).collect()
    }
}

fn decode_row(row: &sqlx::postgres::PgRow) -> Result<Vacancy, StoreError> {
    VacancyRow::from_row(row)
        .map(Vacancy::from)
        .map_err(|e| StoreError::Database(format!("failed to deserialize vacancy row: {}", e)))
}

#[async_trait::async_trait]
impl Beginner for PostgresVacancyStore {
    type Unit = PgUnit;

    async fn begin_tx(&self) -> Result<PgUnit, TxError> {
        self.beginner.begin_tx().await
    }

    fn no_tx(&self) -> PgUnit {
        self.beginner.no_tx()
    }
}

#[async_trait::async_trait]
impl VacancyStore for PostgresVacancyStore {
    async fn find(&self, unit: &mut PgUnit, id: VacancyId) -> Result<Option<Vacancy>, StoreError> {
        self.find_vacancy(unit, id).await
    }

    async fn upsert(
        &self,
        unit: &mut PgUnit,
        company_id: CompanyId,
        draft: &VacancyDraft,
    ) -> Result<Vacancy, StoreError> {
        self.upsert_vacancy(unit, company_id, draft).await
    }

    async fn fetch_page(
        &self,
        unit: &mut PgUnit,
        categories: &[CategoryId],
        bound: Bound,
        limit: u32,
    ) -> Result<Vec<Vacancy>, StoreError> {
        self.fetch_vacancy_page(unit, categories, bound, limit).await
    }
}

// SQLx row types

#[derive(Debug)]
struct VacancyRow {
    id: uuid::Uuid,
    company_id: uuid::Uuid,
    category_id: i64,
    title: String,
    description: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    position: i64,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for VacancyRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(VacancyRow {
            id: row.try_get("id")?,
            company_id: row.try_get("company_id")?,
            category_id: row.try_get("category_id")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            position: row.try_get("position")?,
        })
    }
}

impl From<VacancyRow> for Vacancy {
    fn from(row: VacancyRow) -> Self {
        Vacancy {
            id: VacancyId::from_uuid(row.id),
            company_id: CompanyId::from_uuid(row.company_id),
            category_id: CategoryId::new(row.category_id),
            title: row.title,
            description: row.description,
            created_at: row.created_at,
            updated_at: row.updated_at,
            position: row.position,
        }
    }
}
