pub mod activity;
pub mod audit;
pub mod backup;
pub mod catalog;
pub mod config;
pub mod detector;
pub mod engine;
pub mod model;
pub mod paths;
pub mod snapshot;
pub mod toast;
pub mod util;
pub mod warn;
pub mod watcher;
