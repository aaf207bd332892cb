pub mod app;
pub mod cli;
pub mod config;
pub mod notes;
pub mod store;
pub mod ui;

pub use config::{AppConfig, ConfigLoader, ConfigPaths};
pub use notes::{Note, NoteEditor, NoteId, NoteList, NoteRepository, Timestamp};
