//! Command-line surface shared by the producer and consumer programs

use clap::Args;
use shmbox_core::{ProtocolConfig, Result, SegmentName, DEFAULT_MESSAGE};
use std::path::PathBuf;
use std::time::Duration;

/// Options both roles accept
#[derive(Args, Debug, Clone)]
pub struct RoundArgs {
    /// Path the segment is registered under
    #[arg(long)]
    pub segment: PathBuf,

    /// Number of mailbox slots
    #[arg(long, default_value_t = 8)]
    pub boxes: usize,

    /// Milliseconds between sends or sweeps
    #[arg(long, default_value_t = 10)]
    pub interval_ms: u64,

    /// Message sent and counted
    #[arg(long, default_value = DEFAULT_MESSAGE)]
    pub message: String,
}

impl RoundArgs {
    pub fn segment_name(&self) -> Result<SegmentName> {
        SegmentName::new(&self.segment)
    }

    pub fn config(&self) -> ProtocolConfig {
        let interval = Duration::from_millis(self.interval_ms);
        ProtocolConfig::new()
            .boxes(self.boxes)
            .send_interval(interval)
            .sweep_interval(interval)
            .message(self.message.clone())
    }
}

pub fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}
