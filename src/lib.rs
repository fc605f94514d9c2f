pub mod collate;
pub mod config;
pub mod evaluation;
pub mod history;
pub mod model;
pub mod pipeline;
pub mod play;
pub mod scenario;
pub mod schema;
pub mod stats;
pub mod storage;
pub mod synthetic;
pub mod trends;
