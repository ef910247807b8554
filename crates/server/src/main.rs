use clap::Parser;
use hamlet_server::Config;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("hamlet_server=info,hamlet_engine=info")),
        )
        .init();

    let config = Config::parse();
    hamlet_server::serve(config).await
}
