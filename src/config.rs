//! 프로토콜 설정

use std::str::FromStr;
use std::time::Duration;

use crate::{Error, Result, DEFAULT_CHUNK_SIZE, MAX_PAYLOAD_SIZE};

/// SWP 프로토콜 설정
///
/// 송신자와 수신자 모두 생성 시점에 설정을 받는다.
/// 테스트에서는 짧은 타임아웃과 작은 재시도 상한을 주입한다.
#[derive(Debug, Clone)]
pub struct Config {
    /// 청크 페이로드 크기 (바이트, 1 ~ 4092)
    pub chunk_size: usize,

    /// ACK 대기 타임아웃 (밀리초, 시도 1회당)
    pub ack_timeout_ms: u64,

    /// 청크당 최대 재시도 횟수 (타임아웃 1회 = 재시도 1회)
    pub max_retries: u32,

    /// 수신자가 데이터그램마다 보내는 ACK 사본 수
    pub ack_repeat: u32,

    /// 종료 마커 ACK 이후 추가로 보내는 종료 마커 수
    pub trailing_end_markers: u32,

    /// 추가 종료 마커 송신 간격 (밀리초)
    pub trailing_end_marker_interval_ms: u64,

    /// 수신 버퍼 크기
    /// 최대 데이터그램보다 크게 잡아서 초과 크기 패킷을 걸러낸다
    pub recv_buffer_size: usize,

    /// 출력 경로 미지정 시 자동 파일명 접두사
    pub fallback_prefix: String,

    /// 출력 경로 미지정 시 자동 파일명 확장자
    pub fallback_extension: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            ack_timeout_ms: 350,                  // 350ms
            max_retries: 5000,
            ack_repeat: 3,
            trailing_end_markers: 10,
            trailing_end_marker_interval_ms: 50,  // 50ms
            recv_buffer_size: 65535,
            fallback_prefix: "received".into(),
            fallback_extension: "bin".into(),
        }
    }
}

impl Config {
    /// ACK 대기 시간
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    /// 추가 종료 마커 송신 간격
    pub fn trailing_end_marker_interval(&self) -> Duration {
        Duration::from_millis(self.trailing_end_marker_interval_ms)
    }

    /// 설정 검증
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 || self.chunk_size > MAX_PAYLOAD_SIZE {
            return Err(Error::InvalidConfig(format!(
                "chunk_size must be within 1..={}, got {}",
                MAX_PAYLOAD_SIZE, self.chunk_size
            )));
        }
        if self.ack_timeout_ms == 0 {
            return Err(Error::InvalidConfig("ack_timeout_ms must be positive".into()));
        }
        if self.max_retries == 0 {
            return Err(Error::InvalidConfig("max_retries must be positive".into()));
        }
        if self.ack_repeat == 0 {
            return Err(Error::InvalidConfig("ack_repeat must be positive".into()));
        }
        if self.recv_buffer_size < crate::MAX_DATAGRAM_SIZE {
            return Err(Error::InvalidConfig(format!(
                "recv_buffer_size must be at least {}",
                crate::MAX_DATAGRAM_SIZE
            )));
        }
        Ok(())
    }

    /// 저지연 LAN용 설정
    pub fn low_latency() -> Self {
        Self {
            ack_timeout_ms: 50,
            max_retries: 2000,
            trailing_end_markers: 5,
            trailing_end_marker_interval_ms: 10,
            ..Self::default()
        }
    }

    /// 불안정한 네트워크용 설정
    pub fn unstable_network() -> Self {
        Self {
            ack_timeout_ms: 600,
            max_retries: 10000,
            ack_repeat: 5,                        // ACK 손실 대비
            trailing_end_markers: 20,
            trailing_end_marker_interval_ms: 50,
            ..Self::default()
        }
    }
}

/// 설정 프리셋 (CLI `--profile`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Profile {
    #[default]
    Default,
    LowLatency,
    Unstable,
}

impl Profile {
    pub fn config(self) -> Config {
        match self {
            Profile::Default => Config::default(),
            Profile::LowLatency => Config::low_latency(),
            Profile::Unstable => Config::unstable_network(),
        }
    }
}

impl FromStr for Profile {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "default" => Ok(Profile::Default),
            "low-latency" => Ok(Profile::LowLatency),
            "unstable" => Ok(Profile::Unstable),
            other => Err(format!(
                "unknown profile '{}', expected default|low-latency|unstable",
                other
            )),
        }
    }
}
