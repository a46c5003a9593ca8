//! Main entry point for the CLI command.

use anyhow::Result;

fn main() -> Result<()> {
    edgehog_relay::main()
}
