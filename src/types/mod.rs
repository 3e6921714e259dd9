//! Public types for the Mimir API.

mod message;
mod passage;
mod query;
mod response;

pub use message::{Message, Role};
pub use passage::RetrievedPassage;
pub use query::Query;
pub use response::{ChatAnswer, ChatEvent, ChatStream};
