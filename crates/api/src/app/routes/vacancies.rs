use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use jobboard_core::VacancyId;
use jobboard_infra::ListVacancies;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_vacancies).post(upsert_vacancy))
        .route("/:id", get(get_vacancy))
}

pub async fn upsert_vacancy(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::UpsertVacancyRequest>,
) -> axum::response::Response {
    let (company_id, draft) = body.into_parts();
    match services.upsert_vacancy(company_id, draft).await {
        Ok(vacancy) => (StatusCode::OK, Json(dto::vacancy_to_json(&vacancy))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn get_vacancy(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: VacancyId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid vacancy id"),
    };

    match services.get_vacancy(id).await {
        Ok(vacancy) => (StatusCode::OK, Json(dto::vacancy_to_json(&vacancy))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn list_vacancies(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::ListVacanciesQuery>,
) -> axum::response::Response {
    let categories = match query.category_ids() {
        Ok(ids) => ids,
        Err(msg) => return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
    };

    let limit = query.page_limit();
    let request = ListVacancies {
        categories,
        cursor: query.cursor,
        limit,
    };

    match services.list_vacancies(request).await {
        Ok(page) => (StatusCode::OK, Json(dto::page_to_json(&page))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
