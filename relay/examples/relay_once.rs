//! Process a single queue message read from stdin.
//!
//! ```shell
//! export RELAY_DESTINATION_ENDPOINT=https://archive.blob.core.windows.net
//! cat event.json | cargo run --example relay_once
//! ```

use blobrelay::{Config, Outcome, Relay};
use blobrelay_core::{Context, OsEnv};
use blobrelay_http_send_reqwest::ReqwestHttpSend;
use std::io::Read;

#[tokio::main]
async fn main() {
    env_logger::init();

    let mut body = Vec::new();
    std::io::stdin()
        .read_to_end(&mut body)
        .expect("read message from stdin");

    let ctx = Context::new()
        .with_http_send(ReqwestHttpSend::default())
        .with_env(OsEnv);
    let config = Config::default().from_env(&ctx);
    let relay = Relay::new(ctx, config);

    match relay.handle(&body).await {
        Outcome::Completed(summary) => {
            println!("relocated to {}", summary.destination_url)
        }
        Outcome::Abandoned => std::process::exit(1),
    }
}
