use warden::{Client, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let config = Config::load()?;
    let target = config.target_url.clone();

    let mut client = Client::new(config);

    if let Some(target) = target {
        client.on_request(move |mut ctx| {
            let target = target.clone();
            async move {
                ctx.forward(&target, None).await?;
                Ok(())
            }
        });

        client.on_forward(|response| async move {
            Ok(response
                .into_builder()
                .header("X-Filtered-By", "warden")
                .build())
        });
    }

    let bound = client.bind().await?;
    let shutdown = bound.shutdown_handle();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            shutdown.shutdown();
        }
    });

    bound.serve().await
}
