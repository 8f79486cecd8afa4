// src/pipeline/mod.rs

pub mod driver;
pub mod event_bus;
pub mod metrics;
pub mod session;

pub use driver::{read_first_frame, DriverOutputs, PipelineDriver};
pub use metrics::PipelineMetrics;
pub use session::CountSnapshot;
