use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    kiwi_cli::run().await
}
