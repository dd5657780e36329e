use std::collections::BTreeMap;

use chrono::Utc;

use jobboard_core::{CategoryId, CompanyId, VacancyId};
use jobboard_vacancies::{Vacancy, VacancyDraft};

use super::{StoreError, VacancyStore};
use crate::pagination::{Bound, Keyed};
use crate::tx::{Beginner, InMemoryBeginner, InMemoryUnit, TxError};

/// Rows plus the sequence that assigns `position`.
#[derive(Debug, Clone, Default)]
pub struct VacancyTable {
    rows: BTreeMap<VacancyId, Vacancy>,
    last_position: i64,
}

impl VacancyTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// In-memory vacancy store.
///
/// Intended for tests/dev.
#[derive(Debug, Clone)]
pub struct InMemoryVacancyStore {
    db: InMemoryBeginner<VacancyTable>,
}

impl Default for InMemoryVacancyStore {
    fn default() -> Self {
        Self {
            db: InMemoryBeginner::new(VacancyTable::default()),
        }
    }
}

impl InMemoryVacancyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed rows, for assertions.
    pub fn committed(&self) -> Result<VacancyTable, TxError> {
        self.db.snapshot()
    }
}

#[async_trait::async_trait]
impl Beginner for InMemoryVacancyStore {
    type Unit = InMemoryUnit<VacancyTable>;

    async fn begin_tx(&self) -> Result<Self::Unit, TxError> {
        self.db.begin_tx().await
    }

    fn no_tx(&self) -> Self::Unit {
        self.db.no_tx()
    }
}

#[async_trait::async_trait]
impl VacancyStore for InMemoryVacancyStore {
    async fn find(&self, unit: &mut Self::Unit, id: VacancyId) -> Result<Option<Vacancy>, StoreError> {
        Ok(unit.state().rows.get(&id).cloned())
    }

    async fn upsert(
        &self,
        unit: &mut Self::Unit,
        company_id: CompanyId,
        draft: &VacancyDraft,
    ) -> Result<Vacancy, StoreError> {
        let table = unit.state_mut()?;
        let now = Utc::now();
        let id = draft.id.unwrap_or_default();

        if let Some(existing) = table.rows.get_mut(&id) {
            existing.apply(draft, now);
            return Ok(existing.clone());
        }

        table.last_position += 1;
        let vacancy = Vacancy {
            id,
            company_id,
            category_id: draft.category_id,
            title: draft.title.clone(),
            description: draft.description.clone(),
            created_at: now,
            updated_at: now,
            position: table.last_position,
        };
        table.rows.insert(id, vacancy.clone());
        Ok(vacancy)
    }

    async fn fetch_page(
        &self,
        unit: &mut Self::Unit,
        categories: &[CategoryId],
        bound: Bound,
        limit: u32,
    ) -> Result<Vec<Vacancy>, StoreError> {
        let mut rows: Vec<Vacancy> = unit
            .state()
            .rows
            .values()
            .filter(|v| categories.is_empty() || categories.contains(&v.category_id))
            .filter(|v| bound.admits(&v.position()))
            .cloned()
            .collect();

        rows.sort_by(|a, b| b.position().cmp(&a.position()));
        rows.truncate(limit as usize);
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tx::Unit;

    fn draft(category: i64, title: &str) -> VacancyDraft {
        VacancyDraft {
            id: None,
            category_id: CategoryId::new(category),
            title: title.to_string(),
            description: String::new(),
        }
    }

    #[tokio::test]
    async fn upsert_assigns_increasing_positions() {
        let store = InMemoryVacancyStore::new();
        let company = CompanyId::new();
        let mut unit = store.begin_tx().await.unwrap();

        let a = store.upsert(&mut unit, company, &draft(1, "a")).await.unwrap();
        let b = store.upsert(&mut unit, company, &draft(1, "b")).await.unwrap();
        unit.commit().await.unwrap();

        assert!(b.position() > a.position());
        assert_eq!(store.committed().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn update_keeps_listing_key() {
        let store = InMemoryVacancyStore::new();
        let company = CompanyId::new();
        let mut unit = store.begin_tx().await.unwrap();
        let created = store.upsert(&mut unit, company, &draft(1, "a")).await.unwrap();

        let mut edit = draft(2, "renamed");
        edit.id = Some(created.id);
        let updated = store.upsert(&mut unit, company, &edit).await.unwrap();

        assert_eq!(updated.position(), created.position());
        assert_eq!(updated.title, "renamed");
        assert_eq!(updated.category_id, CategoryId::new(2));
    }

    #[tokio::test]
    async fn writes_through_no_tx_are_rejected() {
        let store = InMemoryVacancyStore::new();
        let mut unit = store.no_tx();
        let err = store
            .upsert(&mut unit, CompanyId::new(), &draft(1, "a"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Tx(TxError::ReadOnly)));
    }

    #[tokio::test]
    async fn fetch_page_filters_by_category_and_bound() {
        let store = InMemoryVacancyStore::new();
        let company = CompanyId::new();
        let mut unit = store.begin_tx().await.unwrap();
        let first = store.upsert(&mut unit, company, &draft(1, "a")).await.unwrap();
        store.upsert(&mut unit, company, &draft(2, "b")).await.unwrap();
        let third = store.upsert(&mut unit, company, &draft(1, "c")).await.unwrap();
        unit.commit().await.unwrap();

        let mut reader = store.no_tx();
        let ones = store
            .fetch_page(&mut reader, &[CategoryId::new(1)], Bound::Unbounded, 10)
            .await
            .unwrap();
        assert_eq!(ones.iter().map(|v| v.id).collect::<Vec<_>>(), vec![third.id, first.id]);

        let older = store
            .fetch_page(&mut reader, &[], Bound::Before(third.position()), 1)
            .await
            .unwrap();
        assert_eq!(older.len(), 1);
        assert_eq!(older[0].title, "b");
    }
}
