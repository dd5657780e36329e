use serde::Deserialize;

use jobboard_core::{CategoryId, CompanyId, VacancyId};
use jobboard_infra::pagination::Page;
use jobboard_vacancies::{Vacancy, VacancyDraft};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct UpsertVacancyRequest {
    pub id: Option<VacancyId>,
    pub company_id: CompanyId,
    pub category_id: CategoryId,
    pub title: String,
    #[serde(default)]
    pub description: String,
}

impl UpsertVacancyRequest {
    pub fn into_parts(self) -> (CompanyId, VacancyDraft) {
        (
            self.company_id,
            VacancyDraft {
                id: self.id,
                category_id: self.category_id,
                title: self.title,
                description: self.description,
            },
        )
    }
}

/// `GET /vacancies` query string. `categories` is a comma-separated list.
#[derive(Debug, Default, Deserialize)]
pub struct ListVacanciesQuery {
    pub categories: Option<String>,
    pub cursor: Option<String>,
    /// Kept as text so a malformed or oversized value falls back to the
    /// maximum page size instead of failing extraction.
    pub limit: Option<String>,
}

impl ListVacanciesQuery {
    /// Requested page size. Missing or unparsable values become 0, which the
    /// listing clamps to its maximum.
    pub fn page_limit(&self) -> i64 {
        self.limit
            .as_deref()
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .unwrap_or(0)
    }

    /// Categories in the order the client sent them.
    pub fn category_ids(&self) -> Result<Vec<CategoryId>, String> {
        match self.categories.as_deref().map(str::trim) {
            None | Some("") => Ok(Vec::new()),
            Some(raw) => raw
                .split(',')
                .map(|part| {
                    part.trim()
                        .parse::<CategoryId>()
                        .map_err(|_| format!("invalid category id: {:?}", part.trim()))
                })
                .collect(),
        }
    }
}

// -------------------------
// Response mapping
// -------------------------

pub fn vacancy_to_json(v: &Vacancy) -> serde_json::Value {
    serde_json::json!({
        "id": v.id.to_string(),
        "company_id": v.company_id.to_string(),
        "category_id": v.category_id.get(),
        "title": v.title,
        "description": v.description,
        "created_at": v.created_at.to_rfc3339(),
        "updated_at": v.updated_at.to_rfc3339(),
    })
}

pub fn page_to_json(page: &Page<Vacancy>) -> serde_json::Value {
    serde_json::json!({
        "items": page.items.iter().map(vacancy_to_json).collect::<Vec<_>>(),
        "next_cursor": page.next_cursor,
    })
}
