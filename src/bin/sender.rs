//! SWP 송신자 - Stop-and-Wait Protocol
//!
//! 파일을 청크 단위로 나눠 ACK를 받을 때까지 재전송하며 보낸다.
//!
//! 사용법:
//!   cargo run --release --bin swp-sender -- [OPTIONS] --file <PATH>
//!
//! 예시:
//!   # 기본 전송
//!   cargo run --release --bin swp-sender -- --target-ip 127.0.0.1 --target-port 12000 --file photo.jpg
//!
//!   # 손실이 심한 경로
//!   cargo run --release --bin swp-sender -- --file photo.jpg --profile unstable

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use swp::config::Profile;
use swp::{Sender, UdpTransport, DEFAULT_SENDER_PORT};

/// 신뢰성 UDP 파일 송신자
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// 수신자 IP
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    target_ip: IpAddr,

    /// 수신자 포트
    #[arg(long, default_value_t = DEFAULT_SENDER_PORT)]
    target_port: u16,

    /// 전송할 파일
    #[arg(short, long)]
    file: PathBuf,

    /// 설정 프리셋 (default | low-latency | unstable)
    #[arg(long, default_value = "default")]
    profile: Profile,

    /// ACK 대기 타임아웃 (밀리초)
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// 청크당 최대 재시도 횟수
    #[arg(long)]
    max_retries: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let mut config = args.profile.config();
    if let Some(timeout_ms) = args.timeout_ms {
        config.ack_timeout_ms = timeout_ms;
    }
    if let Some(max_retries) = args.max_retries {
        config.max_retries = max_retries;
    }

    let target = SocketAddr::new(args.target_ip, args.target_port);
    let bind_ip = match target {
        SocketAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        SocketAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    };

    info!("Sending file {:?} to {}", args.file, target);
    info!("Chunk size: {} bytes", config.chunk_size);
    info!("ACK timeout: {} ms, max retries: {}", config.ack_timeout_ms, config.max_retries);

    let transport = UdpTransport::bind(SocketAddr::new(bind_ip, 0)).await?;
    let mut sender = Sender::new(config, transport, target)?;

    match sender.send_file(&args.file).await {
        Ok(stats) => {
            info!(
                "Done: {} datagrams sent, {:.1}% retransmitted",
                stats.datagrams_sent,
                stats.retransmission_ratio() * 100.0
            );
            Ok(())
        }
        Err(e) => {
            error!(
                "Error: {} ({} datagrams sent, {} chunks acknowledged)",
                e,
                sender.stats().datagrams_sent,
                sender.stats().chunks_acked
            );
            Err(e.into())
        }
    }
}
