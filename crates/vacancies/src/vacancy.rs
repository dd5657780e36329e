use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use jobboard_core::{CategoryId, CompanyId, DomainError, DomainResult, VacancyId};

pub const MAX_TITLE_LEN: usize = 200;
pub const MAX_DESCRIPTION_LEN: usize = 10_000;

/// A vacancy as submitted by a company.
///
/// `id` is `None` when creating; an existing id turns the submission into an
/// update of that vacancy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VacancyDraft {
    pub id: Option<VacancyId>,
    pub category_id: CategoryId,
    pub title: String,
    pub description: String,
}

impl VacancyDraft {
    /// Check field-level rules and return the draft with trimmed text.
    pub fn validate(mut self) -> DomainResult<Self> {
        self.title = self.title.trim().to_string();
        self.description = self.description.trim().to_string();

        if self.title.is_empty() {
            return Err(DomainError::validation("title must not be empty"));
        }
        if self.title.chars().count() > MAX_TITLE_LEN {
            return Err(DomainError::validation(format!(
                "title must be at most {MAX_TITLE_LEN} characters"
            )));
        }
        if self.description.chars().count() > MAX_DESCRIPTION_LEN {
            return Err(DomainError::validation(format!(
                "description must be at most {MAX_DESCRIPTION_LEN} characters"
            )));
        }
        if self.category_id.get() <= 0 {
            return Err(DomainError::validation("category_id must be positive"));
        }
        Ok(self)
    }
}

/// A persisted vacancy.
///
/// `(created_at, position)` is the listing key: assigned once on insert and
/// never rewritten by later updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vacancy {
    pub id: VacancyId,
    pub company_id: CompanyId,
    pub category_id: CategoryId,
    pub title: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Database-assigned insertion sequence; tie-breaker for equal `created_at`.
    pub position: i64,
}

impl Vacancy {
    /// Apply an accepted draft to an existing vacancy, keeping identity,
    /// ownership and the listing key.
    pub fn apply(&mut self, draft: &VacancyDraft, now: DateTime<Utc>) {
        self.category_id = draft.category_id;
        self.title = draft.title.clone();
        self.description = draft.description.clone();
        self.updated_at = now;
    }
}
