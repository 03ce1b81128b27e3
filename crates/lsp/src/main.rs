use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use mm1_lsp::server::{Mm1LanguageServer, ServerOptions};
use tower_lsp::{LspService, Server};

#[derive(Parser, Debug)]
#[command(author, version, about = "MM1 Language Server")]
struct Cli {
    /// Background analysis timeout in milliseconds, overriding the client's
    /// `analysis.timeoutMs` setting
    #[arg(long, value_name = "MS")]
    timeout_ms: Option<u64>,
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let args = Cli::parse();
    let options = ServerOptions {
        timeout_override: args.timeout_ms.map(Duration::from_millis),
    };

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let shutdown_requested = Arc::new(AtomicBool::new(false));
    let flag = shutdown_requested.clone();
    let (service, socket) =
        LspService::new(move |client| Mm1LanguageServer::new(client, options, flag));

    Server::new(stdin, stdout, socket).serve(service).await;

    // `exit` without a preceding `shutdown` is an unclean exit.
    let clean = shutdown_requested.load(Ordering::SeqCst);
    log::info!("session ended ({})", if clean { "clean" } else { "no shutdown" });
    std::process::exit(if clean { 0 } else { 1 });
}
