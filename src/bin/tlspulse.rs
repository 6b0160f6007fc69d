use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    tlspulse::cli::start().await
}
