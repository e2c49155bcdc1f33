//! skiff - 다중 파일 전송
//!
//! 사용법:
//!   skiff receive [--address 127.0.0.1:9876] [--dir /] [--strip]
//!   skiff send --address <host> [--port 9876] [--absolute] [file ...]
//!
//! 예시:
//!   # /srv/incoming 아래로 수신, 경로는 버리고 파일 이름만 사용
//!   skiff receive -a 0.0.0.0:9876 -d /srv/incoming --strip
//!
//!   # 파일 두 개 전송
//!   skiff send -a 10.0.0.5 notes.txt data/report.csv
//!
//!   # 표준 입력 전송
//!   tar cz project | skiff send -a 10.0.0.5

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use skiff::cli::{Cli, Command, ReceiveArgs, SendArgs};
use skiff::{Config, Receiver, Sender, TcpTransport};

fn init_logging(verbose: u8) -> anyhow::Result<()> {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

async fn run_send(config: Config, args: SendArgs) -> anyhow::Result<()> {
    let destination = args.destination();
    let sources = args.sources().await.context("입력 준비 실패")?;

    let sender = Sender::new(config, TcpTransport);
    let stats = sender
        .send(&destination, sources)
        .await
        .with_context(|| format!("{} 로 전송 실패", destination))?;

    info!("Done: {}", stats.summary());
    Ok(())
}

async fn run_receive(mut config: Config, args: ReceiveArgs) -> anyhow::Result<()> {
    args.apply(&mut config);

    let receiver = Receiver::bind(&TcpTransport, &args.address, config, args.policy())
        .await
        .with_context(|| format!("{} 에서 수신 시작 실패", args.address))?;

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested");
                signal.cancel();
            }
            Err(e) => warn!("Failed to listen for ctrl-c: {}", e),
        }
    });

    let stats = receiver.run(shutdown).await.context("수신 루프 실패")?;
    info!("Done: {}", stats.summary());
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let config = match &cli.config {
        Some(path) => Config::load(path).with_context(|| format!("설정 로드 실패: {:?}", path))?,
        None => Config::default(),
    };

    match cli.command {
        Command::Send(args) => run_send(config, args).await,
        Command::Receive(args) => run_receive(config, args).await,
    }
}
