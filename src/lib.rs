pub mod app;
pub mod classify;
pub mod config;
pub mod descriptor;
pub mod domain;
pub mod error;
pub mod fields;
pub mod fs_util;
pub mod matcher;
pub mod metadata;
pub mod naming;
pub mod output;
pub mod session;
pub mod store;
pub mod templates;
