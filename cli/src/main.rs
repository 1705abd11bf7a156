use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::{Map, Value};
use streammux::{Multiplexer, MuxConfig, MuxError, MuxEvent, WireEncoding, WsConnector};
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("payload must be a JSON object")]
    NotAnObject,
    #[error("timed out after {0}s")]
    Timeout(u64),
    #[error("{method} failed: {source}")]
    Request {
        method: String,
        #[source]
        source: MuxError,
    },
    #[error(transparent)]
    Mux(#[from] MuxError),
}

#[derive(Parser, Debug)]
#[command(name = "streammux-cli", about = "Request and subscribe over a multiplexed websocket stream")]
struct Cli {
    #[arg(long, env = "STREAMMUX_URL", default_value = "ws://127.0.0.1:17110")]
    url: String,

    #[arg(long, env = "STREAMMUX_ENCODING", value_enum, default_value_t = Encoding::Json)]
    encoding: Encoding,

    #[arg(long, default_value_t = 10, help = "Seconds to wait for the stream to open")]
    connect_timeout_secs: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Encoding {
    Json,
    Protobuf,
}

impl From<Encoding> for WireEncoding {
    fn from(encoding: Encoding) -> Self {
        match encoding {
            Encoding::Json => Self::Json,
            Encoding::Protobuf => Self::Protobuf,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send one request and print its response.
    Request(RequestArgs),
    /// Subscribe and print notifications as JSON lines.
    Subscribe(SubscribeArgs),
}

#[derive(Args, Debug)]
struct RequestArgs {
    /// Request method, e.g. `getInfoRequest`.
    method: String,

    #[arg(long, default_value = "{}")]
    data: String,

    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,
}

#[derive(Args, Debug)]
struct SubscribeArgs {
    /// Subscribe method, e.g. `notifyBlockAddedRequest`.
    method: String,

    #[arg(long, default_value = "{}")]
    data: String,

    #[arg(long, help = "Exit after this many notifications")]
    count: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let config = MuxConfig::from_env();
    let connector = WsConnector::new(&cli.url)
        .with_encoding(cli.encoding.into())
        .with_max_message_size(config.max_message_size);
    let mux = Multiplexer::connect(connector, config);
    log_events(&mux);

    tokio::time::timeout(Duration::from_secs(cli.connect_timeout_secs), mux.wait_open())
        .await
        .map_err(|_| CliError::Timeout(cli.connect_timeout_secs))??;
    info!(url = %cli.url, "stream open");

    let result = match cli.command {
        Command::Request(args) => run_request(&mux, args).await,
        Command::Subscribe(args) => run_subscribe(&mux, args).await,
    };
    mux.shutdown().await;
    result
}

async fn run_request(mux: &Multiplexer, args: RequestArgs) -> Result<(), CliError> {
    let payload = parse_object(&args.data)?;
    let response = tokio::time::timeout(Duration::from_secs(args.timeout_secs), mux.request(&args.method, payload))
        .await
        .map_err(|_| CliError::Timeout(args.timeout_secs))?
        .map_err(|source| CliError::Request { method: args.method.clone(), source })?;
    print_json(&response)
}

async fn run_subscribe(mux: &Multiplexer, args: SubscribeArgs) -> Result<(), CliError> {
    let payload = parse_object(&args.data)?;
    let mut subscription = mux.subscribe(&args.method, payload)?;
    info!(method = %args.method, id = %subscription.id(), "subscribed");

    let mut received = 0_usize;
    loop {
        tokio::select! {
            value = subscription.recv() => {
                let Some(value) = value else { break };
                print_json_line(&value)?;
                received = received.saturating_add(1);
                if args.count.is_some_and(|limit| received >= limit) {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    mux.unsubscribe(&args.method, subscription.id())?;
    eprintln!("subscribe complete: method={} received={received}", args.method);
    Ok(())
}

fn log_events(mux: &Multiplexer) {
    let mut events = mux.events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                MuxEvent::Error { message } => warn!(%message, "stream error"),
                MuxEvent::Closed => warn!("stream closed; reconnecting"),
                MuxEvent::Reconnected => info!("stream reconnected"),
            }
        }
    });
}

fn parse_object(raw: &str) -> Result<Value, CliError> {
    let value = serde_json::from_str::<Value>(raw)?;
    match value {
        Value::Object(_) => Ok(value),
        Value::Null => Ok(Value::Object(Map::new())),
        _ => Err(CliError::NotAnObject),
    }
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}

fn print_json_line(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string(value)?;
    println!("{rendered}");
    Ok(())
}
