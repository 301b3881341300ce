pub mod change_log;
pub mod collaborators;
pub mod config;
pub mod contributions;
pub mod cursor;
pub mod diff;
pub mod document_room;
pub mod errors;
pub mod ids;
pub mod logging;
pub mod operation;
pub mod protocol;
pub mod registry;
pub mod transport;
pub mod version_control;
