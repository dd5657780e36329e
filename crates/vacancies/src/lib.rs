//! Vacancy domain: drafts submitted by companies and the stored rows listed to
//! candidates.

pub mod vacancy;

pub use vacancy::{Vacancy, VacancyDraft, MAX_DESCRIPTION_LEN, MAX_TITLE_LEN};
