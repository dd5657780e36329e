//! Infrastructure layer: units of work, keyset pagination, vacancy storage
//! and configuration.

pub mod config;
pub mod pagination;
pub mod tx;
pub mod vacancy_service;
pub mod vacancy_store;

pub use config::{AppConfig, ConfigError};
pub use vacancy_service::{ListVacancies, VacancyService, VacancyServiceError};
