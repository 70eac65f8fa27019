pub mod checkpoint;
pub mod config;
pub mod errors;
pub mod fallback;
pub mod logging;
pub mod observer;
pub mod panel;
pub mod pipeline;
pub mod provider;
pub mod retry;
pub mod ui;
pub mod util;
pub mod validation;
