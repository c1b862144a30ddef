pub mod api;
pub mod apply;
pub mod config;
pub mod content_script;
pub mod dedup;
pub mod dom;
pub mod error;
pub mod markup;
pub mod matches;
pub mod pipeline;
pub mod session;
pub mod settings;
pub mod surface;
pub mod telemetry;
pub mod ui;
