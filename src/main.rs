use anyhow::Result;
use chatkit::cli;

#[tokio::main]
async fn main() -> Result<()> {
    cli::run().await
}
