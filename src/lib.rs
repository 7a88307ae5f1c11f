pub mod badge;
pub mod config;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod report;
pub mod scholar;
pub mod store;
pub mod webdriver;
