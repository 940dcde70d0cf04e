use axum::{
    Router,
    routing::{delete, get, post, put},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers::{
    AppState, add_genre, create_lending, extend_lending, get_availability, get_book, get_lending,
    list_lendings, list_popular_books, remove_genre, return_lending, run_overdue_sweep,
    set_lending_status, update_stock,
};

/// Creates the API router with all lending and book endpoints
///
/// Lending endpoints:
/// - POST /lendings - Create a new lending
/// - GET /lendings - List lendings by reader, book or status (all when unfiltered)
/// - GET /lendings/popular-books - Most borrowed books
/// - GET /lendings/:id - Get lending details
/// - POST /lendings/:id/return - Return a book
/// - POST /lendings/:id/extend - Extend the due date
/// - PUT /lendings/:id/status - Administrative status override
/// - POST /lendings/sweep - Run the overdue sweep now
///
/// Book endpoints:
/// - GET /books/:id - Book view with available stock
/// - GET /books/:id/availability - Available stock only
/// - PUT /books/:id/stock - Change nominal stock
/// - POST /books/:id/genres - Add a genre
/// - DELETE /books/:id/genres/:name - Remove a genre
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check endpoint
        .route("/health", get(health_check))
        // Lending endpoints
        .route("/lendings", post(create_lending).get(list_lendings))
        .route("/lendings/sweep", post(run_overdue_sweep))
        .route("/lendings/popular-books", get(list_popular_books))
        .route("/lendings/:id", get(get_lending))
        .route("/lendings/:id/return", post(return_lending))
        .route("/lendings/:id/extend", post(extend_lending))
        .route("/lendings/:id/status", put(set_lending_status))
        // Book endpoints
        .route("/books/:id", get(get_book))
        .route("/books/:id/availability", get(get_availability))
        .route("/books/:id/stock", put(update_stock))
        .route("/books/:id/genres", post(add_genre))
        .route("/books/:id/genres/:name", delete(remove_genre))
        // Add tracing middleware
        .layer(TraceLayer::new_for_http())
        // Add application state
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
