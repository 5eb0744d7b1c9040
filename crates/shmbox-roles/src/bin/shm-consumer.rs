//! Consumer role - attach to a named segment and drain its mailbox
//!
//! Sweeps until the deadline and exits with the number of messages received.
//!
//! Usage:
//! ```bash
//! shm-consumer --segment testshm.shm --deadline-secs 5
//! ```

use clap::Parser;
use shmbox_core::process::role_exit_code;
use shmbox_core::{consume, MailboxArray, Result, SegmentManager};
use shmbox_roles::{init_logging, RoundArgs};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(about = "Receive messages from a shared mailbox")]
struct Cli {
    #[command(flatten)]
    round: RoundArgs,

    /// Seconds to keep sweeping
    #[arg(long, default_value_t = 5)]
    deadline_secs: u64,
}

fn run(cli: &Cli) -> Result<usize> {
    let config = cli
        .round
        .config()
        .deadline(Duration::from_secs(cli.deadline_secs));
    config.validate()?;

    let manager = SegmentManager::new();
    let shm = manager.attach(&cli.round.segment_name()?)?;
    let boxes = MailboxArray::new(&shm, config.boxes)?;
    let received = consume(&boxes, &config);

    drop(boxes);
    manager.detach(shm)?;
    received
}

fn main() {
    init_logging();
    let cli = Cli::parse();
    std::process::exit(role_exit_code(&run(&cli)));
}
