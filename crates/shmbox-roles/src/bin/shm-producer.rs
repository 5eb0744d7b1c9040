//! Producer role - attach to a named segment and fill its mailbox
//!
//! Exits with the number of messages sent.
//!
//! Usage:
//! ```bash
//! shm-producer --segment testshm.shm
//! ```

use clap::Parser;
use shmbox_core::process::role_exit_code;
use shmbox_core::{produce, MailboxArray, Result, SegmentManager};
use shmbox_roles::{init_logging, RoundArgs};

#[derive(Parser, Debug)]
#[command(about = "Send messages into a shared mailbox")]
struct Cli {
    #[command(flatten)]
    round: RoundArgs,

    /// Number of messages to send
    #[arg(long, default_value_t = 12)]
    messages: usize,

    /// Slots to step back between sends
    #[arg(long, default_value_t = 3)]
    stride: usize,
}

fn run(cli: &Cli) -> Result<usize> {
    let config = cli.round.config().messages(cli.messages).stride(cli.stride);
    config.validate()?;

    let manager = SegmentManager::new();
    let shm = manager.attach(&cli.round.segment_name()?)?;
    let boxes = MailboxArray::new(&shm, config.boxes)?;
    let sent = produce(&boxes, &config);

    drop(boxes);
    manager.detach(shm)?;
    sent
}

fn main() {
    init_logging();
    let cli = Cli::parse();
    std::process::exit(role_exit_code(&run(&cli)));
}
