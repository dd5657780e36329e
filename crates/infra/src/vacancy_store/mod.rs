//! Vacancy persistence.
//!
//! Every method takes the caller's unit, so the same store serves reads on a
//! no-op unit and read-then-write sequences inside [`crate::tx::run_in_tx`].

pub mod in_memory;
pub mod postgres;

use thiserror::Error;

use jobboard_core::{CategoryId, CompanyId, VacancyId};
use jobboard_vacancies::{Vacancy, VacancyDraft};

use crate::pagination::{Bound, Keyed, Position};
use crate::tx::{Beginner, TxError};

pub use in_memory::{InMemoryVacancyStore, VacancyTable};
pub use postgres::PostgresVacancyStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Tx(#[from] TxError),

    #[error("database error: {0}")]
    Database(String),
}

#[async_trait::async_trait]
pub trait VacancyStore: Beginner + Clone + 'static {
    async fn find(&self, unit: &mut Self::Unit, id: VacancyId) -> Result<Option<Vacancy>, StoreError>;

    /// Insert, or update the mutable fields of an existing row.
    ///
    /// `id`, `company_id`, `created_at` and `position` of an existing row are
    /// left untouched.
    async fn upsert(
        &self,
        unit: &mut Self::Unit,
        company_id: CompanyId,
        draft: &VacancyDraft,
    ) -> Result<Vacancy, StoreError>;

    /// Up to `limit` rows admitted by `bound`, newest first. An empty
    /// `categories` slice means every category.
    async fn fetch_page(
        &self,
        unit: &mut Self::Unit,
        categories: &[CategoryId],
        bound: Bound,
        limit: u32,
    ) -> Result<Vec<Vacancy>, StoreError>;
}

impl Keyed for Vacancy {
    fn position(&self) -> Position {
        Position {
            created_at: self.created_at,
            sequence: self.position,
        }
    }
}
