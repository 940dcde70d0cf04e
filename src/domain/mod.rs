pub mod availability;
pub mod book;
pub mod commands;
pub mod errors;
pub mod events;
pub mod lending;
pub mod value_objects;

pub use book::Book;
pub use errors::*;
pub use events::*;
pub use lending::{Lending, LendingStatus};
pub use value_objects::*;
