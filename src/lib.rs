pub mod clipboard;
pub mod config;
pub mod errors;
pub mod hash;
pub mod history;
pub mod logging;
pub mod notify;
pub mod storage;
pub mod tui;
pub mod watcher;
