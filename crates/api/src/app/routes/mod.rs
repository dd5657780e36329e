use axum::Router;

pub mod system;
pub mod vacancies;

pub fn router() -> Router {
    Router::new().nest("/vacancies", vacancies::router())
}
