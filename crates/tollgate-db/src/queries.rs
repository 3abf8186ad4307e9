//! Query functions, one module per entity.

pub mod channels;
pub mod chunks;
pub mod settings;
pub mod task_logs;
