//! SWP 수신자 - Stop-and-Wait Protocol
//!
//! 고정 포트에서 전송을 차례로 받아 파일로 재조립한다.
//! Ctrl-C로 중단할 때까지 전송이 끝날 때마다 다음 전송을 기다린다.
//!
//! 사용법:
//!   cargo run --release --bin swp-receiver -- [OPTIONS]
//!
//! 예시:
//!   # 송신자 주소 기반 파일명으로 저장
//!   cargo run --release --bin swp-receiver -- --port 12001
//!
//!   # 출력 경로 지정
//!   cargo run --release --bin swp-receiver -- --port 12001 --output received_direct.jpg

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use swp::config::Profile;
use swp::{Receiver, UdpTransport, DEFAULT_RECEIVER_PORT};

/// 신뢰성 UDP 파일 수신자
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// 리슨 포트
    #[arg(short, long, default_value_t = DEFAULT_RECEIVER_PORT)]
    port: u16,

    /// 출력 파일 (생략 시 송신자 주소 기반 이름)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// 설정 프리셋 (default | low-latency | unstable)
    #[arg(long, default_value = "default")]
    profile: Profile,

    /// 데이터그램당 ACK 사본 수
    #[arg(long)]
    ack_repeat: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let mut config = args.profile.config();
    if let Some(ack_repeat) = args.ack_repeat {
        config.ack_repeat = ack_repeat;
    }

    let bind_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), args.port);
    info!("Server listening on port {}", args.port);
    info!("Output file argument: {:?}", args.output);

    let transport = UdpTransport::bind(bind_addr).await?;
    let mut receiver = Receiver::new(config, transport, args.output)?;

    let result = tokio::select! {
        result = receiver.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Server stopped manually");
            Ok(())
        }
    };

    // 열린 전송이 있으면 파일 정리 후 소켓 해제
    receiver.abort_transfer();
    drop(receiver);
    info!("Server socket closed");

    if let Err(e) = result {
        error!("Error: {}", e);
        return Err(e.into());
    }
    Ok(())
}
