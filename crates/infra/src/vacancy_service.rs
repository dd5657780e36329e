//! Vacancy use cases: upsert, get and the keyset listing.
//!
//! Reads run on the store's no-op unit. Upserts are read-then-write and go
//! through [`run_in_tx`], so they retry on serialization conflicts.

use std::time::Duration;

use thiserror::Error;
use tracing::instrument;

use jobboard_core::{CategoryId, CompanyId, DomainError, VacancyId};
use jobboard_vacancies::{Vacancy, VacancyDraft};

use crate::pagination::{list_page, InvalidCursor, Page, PageRequest};
use crate::tx::{run_in_tx, Beginner, RetrySettings, TxError, Unit, DEFAULT_ATTEMPTS};
use crate::vacancy_store::{StoreError, VacancyStore};

#[derive(Debug, Error)]
pub enum VacancyServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    InvalidCursor(#[from] InvalidCursor),

    /// Every attempt lost a serialization conflict. Safe to retry later.
    #[error("concurrent transaction")]
    ConcurrentTransaction,

    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("store error: {0}")]
    Store(String),
}

impl From<TxError> for VacancyServiceError {
    fn from(err: TxError) -> Self {
        match err {
            TxError::ConcurrentTransaction => Self::ConcurrentTransaction,
            TxError::Cancelled(msg) => Self::Cancelled(msg),
            other => Self::Store(other.to_string()),
        }
    }
}

impl From<StoreError> for VacancyServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Tx(tx) => tx.into(),
            StoreError::Database(msg) => Self::Store(msg),
        }
    }
}

/// Listing query. `categories` doubles as the cursor's filter fingerprint, so
/// its order is significant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListVacancies {
    pub categories: Vec<CategoryId>,
    pub cursor: Option<String>,
    pub limit: i64,
}

#[derive(Debug, Clone)]
pub struct VacancyService<S> {
    store: S,
    tx_attempts: i64,
    tx_timeout: Option<Duration>,
}

impl<S: VacancyStore> VacancyService<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            tx_attempts: i64::from(DEFAULT_ATTEMPTS),
            tx_timeout: None,
        }
    }

    /// Attempts per upsert. Non-positive values fall back to the default.
    pub fn with_tx_attempts(mut self, attempts: i64) -> Self {
        self.tx_attempts = attempts;
        self
    }

    pub fn with_tx_timeout(mut self, timeout: Duration) -> Self {
        self.tx_timeout = Some(timeout);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn retry_settings(&self) -> RetrySettings {
        let settings = RetrySettings::default().with_attempts(self.tx_attempts);
        match self.tx_timeout {
            Some(timeout) => settings.with_timeout(timeout),
            None => settings,
        }
    }

    /// Create a vacancy, or update one the company already owns.
    ///
    /// A draft naming a vacancy owned by another company fails with
    /// `NotFound`. A draft naming an unknown id is inserted under that id.
    #[instrument(skip(self, draft), fields(company_id = %company_id), err)]
    pub async fn upsert(
        &self,
        company_id: CompanyId,
        draft: VacancyDraft,
    ) -> Result<Vacancy, VacancyServiceError> {
        let draft = draft.validate()?;
        let store = self.store.clone();

        run_in_tx(&self.store, self.retry_settings(), move |unit| {
            let store = store.clone();
            let draft = draft.clone();
            Box::pin(async move {
                if let Some(id) = draft.id {
                    if let Some(existing) = store.find(unit, id).await? {
                        if existing.company_id != company_id {
                            return Err(DomainError::not_found().into());
                        }
                    }
                }

                let vacancy = store.upsert(unit, company_id, &draft).await?;
                Ok::<Vacancy, VacancyServiceError>(vacancy)
            })
        })
        .await
    }

    #[instrument(skip(self), err)]
    pub async fn get(&self, id: VacancyId) -> Result<Vacancy, VacancyServiceError> {
        let mut unit = self.store.no_tx();
        let found = self.store.find(&mut unit, id).await?;
        unit.commit().await?;

        found.ok_or_else(|| DomainError::not_found().into())
    }

    /// One page of vacancies, newest first.
    #[instrument(skip(self, query), fields(categories = query.categories.len(), limit = query.limit), err)]
    pub async fn list(&self, query: ListVacancies) -> Result<Page<Vacancy>, VacancyServiceError> {
        let ListVacancies {
            categories,
            cursor,
            limit,
        } = query;

        let request = PageRequest {
            filters: categories.iter().map(|c| c.get()).collect(),
            cursor,
            limit,
        };

        let mut unit = self.store.no_tx();
        let store = &self.store;
        let categories = categories.as_slice();
        let conn = &mut unit;

        let page = list_page(&request, |bound, size| async move {
            store
                .fetch_page(conn, categories, bound, size)
                .await
                .map_err(VacancyServiceError::from)
        })
        .await?;

        unit.commit().await?;
        Ok(page)
    }
}
