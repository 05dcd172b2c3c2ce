//! 프로토콜 메시지 정의
//!
//! - Ack: 수신 확인 (수신자 → 송신자), 정확히 4바이트
//! - Datagram: 수신자가 받은 데이터그램의 분류

use crate::chunk::{Chunk, SeqNum};
use crate::{END_MARKER, HEADER_SIZE};

/// ACK 메시지 (수신자 → 송신자)
///
/// 확인하는 시퀀스 번호(또는 종료 마커 값)만 담는다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub seq: SeqNum,
}

impl Ack {
    pub fn new(seq: SeqNum) -> Self {
        Self { seq }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        self.seq.to_be_bytes()
    }

    /// 길이가 정확히 4바이트가 아니면 ACK가 아님
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let raw: [u8; HEADER_SIZE] = bytes.try_into().ok()?;
        Some(Self {
            seq: SeqNum::from_be_bytes(raw),
        })
    }
}

/// 수신 데이터그램 분류
///
/// 헤더보다 짧거나 최대 크기를 넘는 데이터그램은 분류되지 않는다 (ACK 없이 무시).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Datagram {
    /// 종료 마커
    EndMarker,

    /// 페이로드 없는 일반 시퀀스 (ACK 후 무시)
    Empty(SeqNum),

    /// 페이로드가 있는 데이터 청크
    Data(Chunk),
}

impl Datagram {
    /// 형식이 잘못된 데이터그램은 `None`
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let chunk = Chunk::from_bytes(bytes)?;
        Some(if chunk.is_end_marker() {
            Datagram::EndMarker
        } else if chunk.is_empty() {
            Datagram::Empty(chunk.seq)
        } else {
            Datagram::Data(chunk)
        })
    }

    /// ACK로 돌려줄 시퀀스 번호
    pub fn ack_seq(&self) -> SeqNum {
        match self {
            Datagram::EndMarker => END_MARKER,
            Datagram::Empty(seq) => *seq,
            Datagram::Data(chunk) => chunk.seq,
        }
    }
}
