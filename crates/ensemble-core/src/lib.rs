// Catalog, turn wire types, and prompt construction shared by the server.

pub mod catalog;
pub mod prompt;
pub mod turn;

pub use catalog::{Catalog, CatalogError, Character, Scene};
pub use prompt::{compose_prompt, PromptError, CONFIG_ERROR_MARKER};
pub use turn::{HistoryMessage, TurnRequest};
