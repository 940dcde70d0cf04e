mod catalog;
mod errors;
mod lending_service;
mod overdue_sweep;

pub use catalog::{
    add_genre_to_book, get_availability, get_book_view, is_book_available_for_lending,
    remove_genre_from_book, top_borrowed_books, update_book_stock,
};
pub use errors::{BusinessRule, EntityKind, LendingApplicationError, Result};
pub use lending_service::{
    LendingView, ServiceDependencies, create_lending, extend_lending, find_all_lendings,
    find_lendings_by_book,
    find_lendings_by_lending_date_between, find_lendings_by_reader, find_lendings_by_status,
    find_overdue_unreturned, get_lending, overdue_lendings_for_reader, return_lending,
    set_lending_status,
};
pub use overdue_sweep::{SweepReport, sweep_overdue};
