//! # SWP (Stop-and-Wait Protocol)
//!
//! UDP 기반 신뢰성 파일 전송 프로토콜
//!
//! ## 핵심 특징
//! - **Stop-and-Wait**: 한 번에 ACK 대기 중인 청크는 하나뿐
//! - **순서 번호**: 4바이트 빅엔디안 시퀀스 헤더 + 최대 4092바이트 페이로드
//! - **재전송**: 타임아웃마다 동일 데이터그램 재전송, 청크별 재시도 상한
//! - **재조립**: 수신측 재정렬 버퍼로 손실/중복/순서 뒤바뀜 보정
//! - **종료 마커**: `0xFFFFFFFF` 시퀀스로 스트림 종료 통지, 중복 송신으로 손실 보정

pub mod chunk;
pub mod config;
pub mod error;
pub mod message;
pub mod reassembly;
pub mod receiver;
pub mod sender;
pub mod simulator;
pub mod stats;
pub mod transport;

pub use chunk::{Chunk, ChunkReader, SeqNum};
pub use config::{Config, Profile};
pub use error::{Error, Result};
pub use message::{Ack, Datagram};
pub use reassembly::{Placement, Reassembly};
pub use receiver::{output_path_for, Progress, Receiver, TransferSummary};
pub use sender::{AckWait, Sender};
pub use simulator::{Fault, LinkSimulator, SimulatedEndpoint};
pub use stats::{ReceiveStats, SendStats};
pub use transport::{Transport, UdpTransport};

/// 종료 마커 시퀀스 번호 (페이로드 없음)
pub const END_MARKER: SeqNum = 0xFFFF_FFFF;

/// 시퀀스 헤더 크기 (바이트)
pub const HEADER_SIZE: usize = 4;

/// 데이터그램 최대 크기 (헤더 포함)
pub const MAX_DATAGRAM_SIZE: usize = 4096;

/// 청크 페이로드 최대 크기
pub const MAX_PAYLOAD_SIZE: usize = MAX_DATAGRAM_SIZE - HEADER_SIZE;

/// 기본 청크 크기 (바이트)
pub const DEFAULT_CHUNK_SIZE: usize = MAX_PAYLOAD_SIZE;

/// 송신자 기본 목적지 포트
pub const DEFAULT_SENDER_PORT: u16 = 12000;

/// 수신자 기본 리슨 포트
pub const DEFAULT_RECEIVER_PORT: u16 = 12001;
