#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = alaaska_rust::run().await {
        eprintln!("alaaska-rust fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
