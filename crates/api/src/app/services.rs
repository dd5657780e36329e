use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

use jobboard_core::{CompanyId, VacancyId};
use jobboard_infra::pagination::Page;
use jobboard_infra::vacancy_store::{InMemoryVacancyStore, PostgresVacancyStore, VacancyStore};
use jobboard_infra::{AppConfig, ListVacancies, VacancyService, VacancyServiceError};
use jobboard_vacancies::{Vacancy, VacancyDraft};

/// The vacancy service over whichever backend the process was started with.
#[derive(Debug, Clone)]
pub enum AppServices {
    InMemory(VacancyService<InMemoryVacancyStore>),
    Postgres(VacancyService<PostgresVacancyStore>),
}

/// Select the backend from `DATABASE_URL`: Postgres when set, in-memory otherwise.
pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    match config.database_url.as_deref() {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(config.max_connections)
                .connect(url)
                .await
                .context("failed to connect to Postgres")?;
            tracing::info!(max_connections = config.max_connections, "using Postgres vacancy store");
            Ok(AppServices::Postgres(configure(
                VacancyService::new(PostgresVacancyStore::new(pool)),
                config,
            )))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory vacancy store");
            Ok(AppServices::InMemory(configure(
                VacancyService::new(InMemoryVacancyStore::new()),
                config,
            )))
        }
    }
}

fn configure<S: VacancyStore>(service: VacancyService<S>, config: &AppConfig) -> VacancyService<S> {
    let service = service.with_tx_attempts(config.tx_attempts);
    match config.tx_timeout {
        Some(timeout) => service.with_tx_timeout(timeout),
        None => service,
    }
}

impl AppServices {
    pub fn in_memory() -> Self {
        AppServices::InMemory(VacancyService::new(InMemoryVacancyStore::new()))
    }

    pub async fn upsert_vacancy(
        &self,
        company_id: CompanyId,
        draft: VacancyDraft,
    ) -> Result<Vacancy, VacancyServiceError> {
        match self {
            AppServices::InMemory(svc) => svc.upsert(company_id, draft).await,
            AppServices::Postgres(svc) => svc.upsert(company_id, draft).await,
        }
    }

    pub async fn get_vacancy(&self, id: VacancyId) -> Result<Vacancy, VacancyServiceError> {
        match self {
            AppServices::InMemory(svc) => svc.get(id).await,
            AppServices::Postgres(svc) => svc.get(id).await,
        }
    }

    pub async fn list_vacancies(
        &self,
        query: ListVacancies,
    ) -> Result<Page<Vacancy>, VacancyServiceError> {
        match self {
            AppServices::InMemory(svc) => svc.list(query).await,
            AppServices::Postgres(svc) => svc.list(query).await,
        }
    }
}
