use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let args = wheelhouse::cli::WheelhouseArgs::parse();

    wheelhouse::start_listening(args).await?.await
}
