pub mod assets;
pub mod catalog;
pub mod config;
pub mod error;
pub mod filesystem;
pub mod manifest;
pub mod pipeline;
pub mod reconcile;
pub mod runtime;
pub mod site;
pub mod upstream;
pub mod view;
