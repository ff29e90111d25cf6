use webarchiver::config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = config::from_env()?;
    log::info!("starting crawl at {} -> {}", config.start_url(), config.storage_dir().display());

    let manifest = webarchiver::run(config).await?;

    log::info!(
        "crawl finished: {} pages, {} assets",
        manifest.total_pages,
        manifest.asset_map.len()
    );

    Ok(())
}
