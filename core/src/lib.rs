pub mod pipeline;
pub mod pool;
pub mod process;
pub mod report;
pub mod stage;
pub mod stats;
