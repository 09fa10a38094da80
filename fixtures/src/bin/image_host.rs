use clap::Parser;
use fixtures::{image_host, run_server, FixtureArgs};

/// Fake Cloudinary-compatible image host
#[derive(Parser, Debug)]
#[clap(name = "image-host-fixture")]
struct Cli {
    #[clap(flatten)]
    common: FixtureArgs,

    /// Base URL clients use to reach this server. Defaults to the bound address.
    #[arg(long)]
    public_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let args = Cli::parse();

    let listener = tokio::net::TcpListener::bind(args.common.addr()?).await?;
    let public_url = match args.public_url {
        Some(url) => url,
        None => format!("http://{}", listener.local_addr()?),
    };

    let app = image_host::routes(public_url, image_host::ImageStore::default());

    run_server(listener, app).await
}
