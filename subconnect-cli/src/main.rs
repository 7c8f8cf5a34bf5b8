use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    subconnect_cli::run().await?;
    Ok(())
}
