use clap::Parser;
use fisher_vfs::config::CliArgs;
use fisher_vfs::server::VfsServer;
use fisher_vfs::transport::NdjsonTransport;

fn main() {
    let args = CliArgs::parse();

    // Logs go to stderr; stdout carries the protocol
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level)),
        )
        .init();

    let limits = args.limits();
    tracing::debug!(?limits, "starting with limits");

    let transport = NdjsonTransport::stdout();
    let mut server = VfsServer::new(transport, limits);

    tracing::info!("fisher-vfs ready");

    let stdin = std::io::stdin();
    if let Err(e) = server.run(stdin.lock()) {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
