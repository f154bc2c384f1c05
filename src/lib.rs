pub mod bank;
pub mod config;
pub mod flow;
pub mod logging;
pub mod metadata;
pub mod participant;
pub mod randomize;
pub mod runtime;
pub mod sampler;
pub mod session;
pub mod store;
pub mod term;
