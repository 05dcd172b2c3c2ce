//! 에러 타입 정의

use std::path::PathBuf;

use thiserror::Error;

use crate::chunk::SeqNum;

/// SWP 프로토콜 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    /// 소켓 송수신 실패 (실행 전체에 치명적)
    #[error("전송 계층 에러: {0}")]
    Transport(std::io::Error),

    #[error("입력 파일 없음: {path:?}")]
    InputNotFound { path: PathBuf },

    #[error("ACK 대기 재시도 초과: seq={seq}, retries={retries}")]
    RetriesExhausted { seq: SeqNum, retries: u32 },

    #[error("시퀀스 번호 공간 초과: {chunks}개 청크 이후 종료 마커와 충돌")]
    SequenceExhausted { chunks: u64 },

    #[error("유효하지 않은 설정: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// 소켓 수준 장애인지 여부 (수신 루프 종료 판단용)
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
