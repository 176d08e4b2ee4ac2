#[tokio::main]
async fn main() -> travelplaces::error::Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("travelplaces=info,tower_http=info"),
    )
    .init();
    log::info!("Starting travelplaces API");

    match travelplaces::run().await {
        Ok(()) => {
            log::info!("Server shut down successfully");
            Ok(())
        }
        Err(e) => {
            log::error!("Server encountered an error: {}", e);
            Err(e)
        }
    }
}
