//! 파일 유닛 프레이밍
//!
//! 유닛 하나의 와이어 형식 (정수는 모두 little-endian):
//!
//! ```text
//! [path-len: u32][path: UTF-8][content-len: u64][content]
//! ```
//!
//! - `content-len != STREAMED_LENGTH`: 정확히 `content-len` 바이트의 내용
//! - `content-len == STREAMED_LENGTH`: 길이를 미리 알 수 없는 입력 (stdin 등).
//!   내용은 `[chunk-len: u32][chunk]` 서브프레임의 연속이고 길이 0 서브프레임으로 끝남
//!
//! 유닛은 한 연결 위에 연달아 붙으며 세션 종료 표시는 따로 없다.
//! 유닛 경계에서 연결이 닫히면(EOF) 세션 정상 종료.

use std::time::Duration;

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use crate::{Config, Error, Result};

/// 스트리밍 유닛을 나타내는 내용 길이 값
pub const STREAMED_LENGTH: u64 = u64::MAX;

/// 경로를 제외한 헤더 고정 길이 (path-len + content-len)
pub const HEADER_FIXED_LEN: usize = 4 + 8;

/// 유닛 내용 길이
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentLength {
    /// 미리 알려진 길이
    Known(u64),
    /// 서브프레임으로 나눠 보내는 길이 미정 내용
    Streamed,
}

impl ContentLength {
    fn to_wire(self) -> u64 {
        match self {
            ContentLength::Known(len) => len,
            ContentLength::Streamed => STREAMED_LENGTH,
        }
    }

    fn from_wire(value: u64) -> Self {
        if value == STREAMED_LENGTH {
            ContentLength::Streamed
        } else {
            ContentLength::Known(value)
        }
    }
}

/// 유닛 헤더
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitHeader {
    /// 선언된 원격 경로 (피어 통제 값)
    pub path: String,

    /// 내용 길이
    pub length: ContentLength,
}

impl UnitHeader {
    pub fn new(path: impl Into<String>, length: ContentLength) -> Self {
        Self {
            path: path.into(),
            length,
        }
    }

    /// 인코딩된 헤더 길이
    pub fn encoded_len(&self) -> usize {
        HEADER_FIXED_LEN + self.path.len()
    }

    /// 헤더를 버퍼에 인코딩
    pub fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        if self.path.is_empty() {
            return Err(Error::InvalidPath {
                path: String::new(),
                reason: "빈 경로",
            });
        }
        let path_len = u32::try_from(self.path.len())
            .map_err(|_| Error::Protocol(format!("경로가 너무 김: {} bytes", self.path.len())))?;
        if self.length == ContentLength::Known(STREAMED_LENGTH) {
            return Err(Error::Protocol("표현할 수 없는 내용 길이".into()));
        }

        buf.reserve(self.encoded_len());
        buf.put_u32_le(path_len);
        buf.put_slice(self.path.as_bytes());
        buf.put_u64_le(self.length.to_wire());
        Ok(())
    }
}

/// 유닛 인코더 (송신측)
///
/// 입력은 `chunk_size` 단위로 읽으므로 파일 크기와 무관하게 메모리 사용량이 고정됨
pub struct FrameWriter<W> {
    inner: W,
    chunk_size: usize,
    /// 서브프레임 길이 접두사 자리(4바이트) + 청크
    buf: Vec<u8>,
    bytes_written: u64,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W, chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            inner,
            chunk_size,
            buf: vec![0u8; 4 + chunk_size],
            bytes_written: 0,
        }
    }

    /// 연결에 완전히 쓰인 총 바이트 (헤더 포함)
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    async fn put(&mut self, data: &[u8]) -> Result<()> {
        self.inner
            .write_all(data)
            .await
            .map_err(|e| Error::transport("write", e))?;
        self.bytes_written += data.len() as u64;
        Ok(())
    }

    /// 유닛 하나 전송. 보낸 내용 바이트 수 반환
    pub async fn write_unit<R>(&mut self, header: &UnitHeader, source: &mut R) -> Result<u64>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut encoded = BytesMut::new();
        header.encode(&mut encoded)?;
        self.put(&encoded).await?;

        match header.length {
            ContentLength::Known(len) => self.copy_known(header, source, len).await,
            ContentLength::Streamed => self.copy_streamed(header, source).await,
        }
    }

    async fn copy_known<R>(&mut self, header: &UnitHeader, source: &mut R, len: u64) -> Result<u64>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut remaining = len;
        while remaining > 0 {
            let want = remaining.min(self.chunk_size as u64) as usize;
            let n = source
                .read(&mut self.buf[..want])
                .await
                .map_err(|e| Error::local_io(&header.path, e))?;
            if n == 0 {
                // 선언한 길이를 채울 수 없으면 수신측이 다음 헤더를 찾을 수 없다
                return Err(Error::local_io(
                    &header.path,
                    std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        format!("입력이 {} bytes 일찍 끝남", remaining),
                    ),
                ));
            }

            self.inner
                .write_all(&self.buf[..n])
                .await
                .map_err(|e| Error::transport("write", e))?;
            self.bytes_written += n as u64;
            remaining -= n as u64;
        }
        Ok(len)
    }

    async fn copy_streamed<R>(&mut self, header: &UnitHeader, source: &mut R) -> Result<u64>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut total = 0u64;
        loop {
            let n = source
                .read(&mut self.buf[4..4 + self.chunk_size])
                .await
                .map_err(|e| Error::local_io(&header.path, e))?;

            // 길이 0 서브프레임 = 내용 끝
            self.buf[..4].copy_from_slice(&(n as u32).to_le_bytes());
            self.inner
                .write_all(&self.buf[..4 + n])
                .await
                .map_err(|e| Error::transport("write", e))?;
            self.bytes_written += 4 + n as u64;

            if n == 0 {
                return Ok(total);
            }
            total += n as u64;
        }
    }

    /// 쓰기 방향 종료 (수신측에 세션 끝을 알림)
    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner
            .shutdown()
            .await
            .map_err(|e| Error::transport("shutdown", e))
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// 디코딩 한계값
#[derive(Debug, Clone, Copy)]
struct Limits {
    max_path_len: u32,
    max_unit_size: Option<u64>,
    max_stream_chunk: u32,
}

/// 유닛 디코더 (수신측)
///
/// 읽기 한 번마다 유휴 타임아웃을 적용한다. 전송 계층이 필드를 한 번에
/// 전달한다고 가정하지 않고 필요한 바이트가 찰 때까지 반복해서 읽는다.
pub struct FrameReader<R> {
    inner: R,
    idle: Duration,
    limits: Limits,
    bytes_read: u64,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R, config: &Config) -> Self {
        Self {
            inner,
            idle: config.idle_timeout(),
            limits: Limits {
                max_path_len: config.max_path_len,
                max_unit_size: config.max_unit_size,
                max_stream_chunk: config.max_stream_chunk,
            },
            bytes_read: 0,
        }
    }

    /// 연결에서 읽은 총 바이트
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    async fn read_some(&mut self, buf: &mut [u8]) -> Result<usize> {
        match timeout(self.idle, self.inner.read(buf)).await {
            Ok(Ok(n)) => {
                self.bytes_read += n as u64;
                Ok(n)
            }
            Ok(Err(e)) => Err(Error::transport("read", e)),
            Err(_) => Err(Error::IdleTimeout { idle: self.idle }),
        }
    }

    /// 버퍼를 채운다. EOF 를 만나면 그때까지 채운 바이트 수 반환
    async fn fill(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read_some(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }

    async fn read_exact_field(&mut self, buf: &mut [u8], field: &str) -> Result<()> {
        let filled = self.fill(buf).await?;
        if filled < buf.len() {
            return Err(Error::Protocol(format!(
                "{} 읽는 중 연결 종료 ({}/{} bytes)",
                field,
                filled,
                buf.len()
            )));
        }
        Ok(())
    }

    /// 헤더 하나 디코딩
    ///
    /// 헤더 시작에서 바로 EOF 면 `None` (세션 정상 종료)
    pub async fn read_header(&mut self) -> Result<Option<UnitHeader>> {
        let mut len_buf = [0u8; 4];
        match self.fill(&mut len_buf).await? {
            0 => return Ok(None),
            4 => {}
            n => {
                return Err(Error::Protocol(format!(
                    "헤더 읽는 중 연결 종료 ({}/4 bytes)",
                    n
                )))
            }
        }

        let path_len = u32::from_le_bytes(len_buf);
        if path_len == 0 || path_len > self.limits.max_path_len {
            return Err(Error::Protocol(format!(
                "비정상 경로 길이: {} (최대 {})",
                path_len, self.limits.max_path_len
            )));
        }

        let mut path_buf = vec![0u8; path_len as usize];
        self.read_exact_field(&mut path_buf, "경로").await?;

        let mut content_len = [0u8; 8];
        self.read_exact_field(&mut content_len, "내용 길이").await?;
        let length = ContentLength::from_wire(u64::from_le_bytes(content_len));

        if let (ContentLength::Known(len), Some(max)) = (length, self.limits.max_unit_size) {
            if len > max {
                return Err(Error::Protocol(format!(
                    "비정상 내용 길이: {} (최대 {})",
                    len, max
                )));
            }
        }

        let path = String::from_utf8(path_buf).map_err(|e| Error::InvalidPath {
            path: String::from_utf8_lossy(e.as_bytes()).into_owned(),
            reason: "UTF-8 아님",
        })?;

        Ok(Some(UnitHeader { path, length }))
    }

    /// 헤더 다음의 내용을 읽는 리더
    pub fn content(&mut self, length: ContentLength) -> ContentReader<'_, R> {
        let state = match length {
            ContentLength::Known(remaining) => ContentState::Known { remaining },
            ContentLength::Streamed => ContentState::NeedPrefix,
        };
        ContentReader {
            reader: self,
            state,
            received: 0,
        }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

#[derive(Debug, Clone, Copy)]
enum ContentState {
    Known { remaining: u64 },
    NeedPrefix,
    InChunk { remaining: u32 },
    Done,
}

/// 유닛 내용 리더
pub struct ContentReader<'a, R> {
    reader: &'a mut FrameReader<R>,
    state: ContentState,
    received: u64,
}

impl<R: AsyncRead + Unpin> ContentReader<'_, R> {
    /// 지금까지 받은 내용 바이트
    pub fn received(&self) -> u64 {
        self.received
    }

    /// 내용 조각 하나를 `buf`에 읽는다. 0 이면 유닛 끝
    pub async fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            match self.state {
                ContentState::Done | ContentState::Known { remaining: 0 } => {
                    self.state = ContentState::Done;
                    return Ok(0);
                }
                ContentState::Known { remaining } => {
                    let want = remaining.min(buf.len() as u64) as usize;
                    let n = self.reader.read_some(&mut buf[..want]).await?;
                    if n == 0 {
                        return Err(Error::Protocol(format!(
                            "내용 읽는 중 연결 종료 ({} bytes 남음)",
                            remaining
                        )));
                    }
                    self.state = ContentState::Known {
                        remaining: remaining - n as u64,
                    };
                    self.received += n as u64;
                    return Ok(n);
                }
                ContentState::NeedPrefix => {
                    let mut prefix = [0u8; 4];
                    self.reader
                        .read_exact_field(&mut prefix, "서브프레임 길이")
                        .await?;
                    let len = u32::from_le_bytes(prefix);
                    if len == 0 {
                        self.state = ContentState::Done;
                        return Ok(0);
                    }
                    if len > self.reader.limits.max_stream_chunk {
                        return Err(Error::Protocol(format!(
                            "비정상 서브프레임 길이: {} (최대 {})",
                            len, self.reader.limits.max_stream_chunk
                        )));
                    }
                    self.state = ContentState::InChunk { remaining: len };
                }
                ContentState::InChunk { remaining } => {
                    let want = (remaining as usize).min(buf.len());
                    let n = self.reader.read_some(&mut buf[..want]).await?;
                    if n == 0 {
                        return Err(Error::Protocol(format!(
                            "서브프레임 읽는 중 연결 종료 ({} bytes 남음)",
                            remaining
                        )));
                    }
                    let remaining = remaining - n as u32;
                    self.state = if remaining == 0 {
                        ContentState::NeedPrefix
                    } else {
                        ContentState::InChunk { remaining }
                    };
                    self.received += n as u64;
                    return Ok(n);
                }
            }
        }
    }
}
