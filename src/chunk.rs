//! 청크 정의
//!
//! - Chunk: 시퀀스 헤더(4바이트, 빅엔디안) + 파일 페이로드 (0 ~ 4092 bytes)
//! - ChunkReader: 입력 스트림을 고정 크기 청크로 분할 (송신측)

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::{Error, Result, END_MARKER, HEADER_SIZE, MAX_PAYLOAD_SIZE};

/// 시퀀스 번호 (32비트)
pub type SeqNum = u32;

/// 청크 (데이터그램 단위)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// 시퀀스 번호
    pub seq: SeqNum,

    /// 실제 데이터
    pub data: Bytes,
}

impl Chunk {
    /// 새 청크 생성
    pub fn new(seq: SeqNum, data: Bytes) -> Self {
        Self { seq, data }
    }

    /// 종료 마커 청크
    pub fn end_marker() -> Self {
        Self {
            seq: END_MARKER,
            data: Bytes::new(),
        }
    }

    /// 종료 마커 여부
    pub fn is_end_marker(&self) -> bool {
        self.seq == END_MARKER
    }

    /// 헤더만 있는 청크 여부
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// 청크를 바이트로 직렬화
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + self.data.len());
        buf.put_u32(self.seq);
        buf.extend_from_slice(&self.data);
        buf.freeze()
    }

    /// 바이트에서 청크 역직렬화
    ///
    /// 헤더보다 짧거나 최대 페이로드를 넘는 데이터그램은 `None`.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < HEADER_SIZE || bytes.len() > HEADER_SIZE + MAX_PAYLOAD_SIZE {
            return None;
        }

        let mut header = &bytes[..HEADER_SIZE];
        let seq = header.get_u32();
        let data = Bytes::copy_from_slice(&bytes[HEADER_SIZE..]);

        Some(Self { seq, data })
    }
}

/// 청크 분할기 (송신측)
///
/// 읽기가 0바이트를 반환할 때까지 `chunk_size` 단위로 자른다.
/// 마지막 청크만 짧을 수 있다.
pub struct ChunkReader<R> {
    reader: R,
    chunk_size: usize,
    next_seq: SeqNum,
    exhausted: bool,
}

impl<R: AsyncRead + Unpin> ChunkReader<R> {
    pub fn new(reader: R, chunk_size: usize) -> Self {
        Self {
            reader,
            chunk_size,
            next_seq: 0,
            exhausted: false,
        }
    }

    /// 다음에 부여할 시퀀스 번호 (= 지금까지 만든 청크 수)
    pub fn next_seq(&self) -> SeqNum {
        self.next_seq
    }

    /// 다음 청크 읽기, 입력이 끝나면 `None`
    pub async fn next_chunk(&mut self) -> Result<Option<Chunk>> {
        if self.exhausted {
            return Ok(None);
        }

        let mut buf = BytesMut::zeroed(self.chunk_size);
        let mut filled = 0;

        // 부분 읽기를 모아 청크를 가득 채운다
        while filled < self.chunk_size {
            let n = self.reader.read(&mut buf[filled..]).await?;
            if n == 0 {
                self.exhausted = true;
                break;
            }
            filled += n;
        }

        if filled == 0 {
            return Ok(None);
        }

        // 종료 마커 값은 데이터 청크에 쓸 수 없음
        if self.next_seq == END_MARKER {
            return Err(Error::SequenceExhausted {
                chunks: u64::from(self.next_seq),
            });
        }

        buf.truncate(filled);
        let chunk = Chunk::new(self.next_seq, buf.freeze());
        self.next_seq += 1;

        Ok(Some(chunk))
    }
}
