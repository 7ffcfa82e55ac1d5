pub mod latency;
pub mod monitor_state;

pub use latency::CheckLatency;
pub use monitor_state::{MonitorSnapshot, MonitorState};
