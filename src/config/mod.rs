pub mod poller;

pub use poller::{MonitorConfig, PollerConfig};
