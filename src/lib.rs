pub mod accounts;
pub mod error;
pub mod launcher;
pub mod library;
pub mod menu;
pub mod monitor;
pub mod process;
pub mod registry;
pub mod session;
pub mod settings;
pub mod storage;
pub mod ui;
pub mod vdf;
