//! 송신자
//!
//! - 연결 하나를 열고 모든 입력을 순서대로 유닛으로 전송
//! - 일반 파일은 메타데이터 길이로, stdin 등은 스트리밍 유닛으로 전송
//! - 에러 시 세션 중단 (쓴 바이트 수를 에러에 담음)

use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use crate::codec::{ContentLength, FrameWriter, UnitHeader};
use crate::config::PathPolicy;
use crate::stats::TransferStats;
use crate::transport::{TcpTransport, Transport};
use crate::{Config, Error, Result, STDIN_LABEL};

/// 보낼 수 있는 입력 스트림
type BoxedReader = Box<dyn AsyncRead + Unpin + Send>;

enum SourceKind {
    File(PathBuf),
    Stdin,
    Reader {
        reader: BoxedReader,
        length: ContentLength,
    },
}

/// 전송할 입력 하나 (유닛 하나가 됨)
pub struct Source {
    label: String,
    kind: SourceKind,
}

impl std::fmt::Debug for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.kind {
            SourceKind::File(path) => format!("File({:?})", path),
            SourceKind::Stdin => "Stdin".to_string(),
            SourceKind::Reader { length, .. } => format!("Reader({:?})", length),
        };
        f.debug_struct("Source")
            .field("label", &self.label)
            .field("kind", &kind)
            .finish()
    }
}

/// 로컬 경로 → 헤더에 실을 라벨. 구분자는 `/`로 통일
fn label_for(path: &Path) -> Result<String> {
    let invalid = |reason| Error::InvalidPath {
        path: path.display().to_string(),
        reason,
    };

    let mut parts = Vec::new();
    let mut rooted = false;
    for component in path.components() {
        match component {
            Component::Prefix(_) => {}
            Component::RootDir => rooted = true,
            Component::CurDir => {}
            Component::ParentDir => parts.push(".."),
            Component::Normal(name) => parts.push(name.to_str().ok_or_else(|| invalid("UTF-8 아님"))?),
        }
    }

    if parts.is_empty() {
        return Err(invalid("파일 이름 없음"));
    }

    let joined = parts.join("/");
    Ok(if rooted { format!("/{}", joined) } else { joined })
}

impl Source {
    /// 표준 입력 (스트리밍 유닛)
    pub fn stdin() -> Self {
        Self {
            label: STDIN_LABEL.to_string(),
            kind: SourceKind::Stdin,
        }
    }

    /// 로컬 파일. `absolute_paths`면 정규화된 절대 경로를 라벨로 사용
    pub async fn file(path: impl AsRef<Path>, policy: &PathPolicy) -> Result<Self> {
        let path = path.as_ref();
        let label = if policy.absolute_paths {
            let canonical = tokio::fs::canonicalize(path)
                .await
                .map_err(|e| Error::local_io(path, e))?;
            label_for(&canonical)?
        } else {
            label_for(path)?
        };

        Ok(Self {
            label,
            kind: SourceKind::File(path.to_path_buf()),
        })
    }

    /// 임의의 리더
    pub fn from_reader(
        label: impl Into<String>,
        reader: impl AsyncRead + Unpin + Send + 'static,
        length: ContentLength,
    ) -> Self {
        Self {
            label: label.into(),
            kind: SourceKind::Reader {
                reader: Box::new(reader),
                length,
            },
        }
    }

    /// 메모리 버퍼
    pub fn from_bytes(label: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let length = ContentLength::Known(data.len() as u64);
        Self::from_reader(label, std::io::Cursor::new(data), length)
    }

    /// 명령행 인자 하나. `-`는 표준 입력
    pub async fn from_arg(arg: &Path, policy: &PathPolicy) -> Result<Self> {
        if arg == Path::new("-") {
            Ok(Self::stdin())
        } else {
            Self::file(arg, policy).await
        }
    }

    /// 헤더에 선언될 경로
    pub fn label(&self) -> &str {
        &self.label
    }

    /// 입력 열기. 일반 파일만 길이를 미리 선언한다
    async fn open(self) -> Result<(String, BoxedReader, ContentLength)> {
        match self.kind {
            SourceKind::File(path) => {
                let file = tokio::fs::File::open(&path)
                    .await
                    .map_err(|e| Error::local_io(&path, e))?;
                let metadata = file
                    .metadata()
                    .await
                    .map_err(|e| Error::local_io(&path, e))?;

                // FIFO, /dev/stdin 등은 길이를 알 수 없음
                let length = if metadata.is_file() {
                    ContentLength::Known(metadata.len())
                } else {
                    ContentLength::Streamed
                };
                Ok((self.label, Box::new(file), length))
            }
            SourceKind::Stdin => Ok((
                self.label,
                Box::new(tokio::io::stdin()),
                ContentLength::Streamed,
            )),
            SourceKind::Reader { reader, length } => Ok((self.label, reader, length)),
        }
    }
}

/// 송신자
pub struct Sender<T = TcpTransport> {
    /// 설정
    config: Config,

    /// 전송 계층
    transport: T,
}

impl<T: Transport> Sender<T> {
    /// 새 송신자 생성
    pub fn new(config: Config, transport: T) -> Self {
        Self { config, transport }
    }

    /// 주소로 연결해 모든 입력 전송
    pub async fn send(&self, address: &str, sources: Vec<Source>) -> Result<TransferStats> {
        self.config.validate()?;

        let (conn, peer) = self
            .transport
            .dial(address)
            .await
            .map_err(|e| Error::transport(format!("connect {}", address), e))?;
        info!(%peer, "Connected");

        self.send_over(conn, Some(peer), sources).await
    }

    /// 이미 열린 연결로 모든 입력 전송. 끝나면 쓰기 방향을 닫는다
    pub async fn send_over<W>(
        &self,
        conn: W,
        peer: Option<SocketAddr>,
        sources: Vec<Source>,
    ) -> Result<TransferStats>
    where
        W: AsyncWrite + Unpin,
    {
        let mut writer = FrameWriter::new(conn, self.config.chunk_size);
        let mut stats = TransferStats::new();

        for source in sources {
            match Self::send_one(&mut writer, source).await {
                Ok((label, bytes)) => {
                    stats.record_unit(bytes);
                    info!(path = %label, bytes, "Unit sent");
                }
                Err(e) => {
                    stats.record_failure(0);
                    stats.finish(writer.bytes_written());
                    warn!("Transfer aborted: {} | {}", e, stats.summary());
                    return Err(e.aborted(writer.bytes_written(), peer));
                }
            }
        }

        if let Err(e) = writer.shutdown().await {
            return Err(e.aborted(writer.bytes_written(), peer));
        }

        stats.finish(writer.bytes_written());
        info!("Transfer complete: {}", stats.summary());
        Ok(stats)
    }

    async fn send_one<W: AsyncWrite + Unpin>(
        writer: &mut FrameWriter<W>,
        source: Source,
    ) -> Result<(String, u64)> {
        let (label, mut reader, length) = source.open().await?;
        debug!(path = %label, ?length, "Sending unit");

        let header = UnitHeader::new(label, length);
        let bytes = writer.write_unit(&header, &mut reader).await?;
        Ok((header.path, bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{SessionHandler, SessionStatus};
    use crate::ErrorKind;
    use std::sync::Arc;
    use tokio::io::duplex;

    #[test]
    fn test_labels_use_forward_slashes() {
        assert_eq!(label_for(Path::new("a/b/c.txt")).unwrap(), "a/b/c.txt");
        assert_eq!(label_for(Path::new("./a//b.txt")).unwrap(), "a/b.txt");
        assert_eq!(label_for(Path::new("../up.txt")).unwrap(), "../up.txt");
        #[cfg(unix)]
        assert_eq!(label_for(Path::new("/tmp/x.bin")).unwrap(), "/tmp/x.bin");

        let err = label_for(Path::new(".")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidPath);
    }

    #[tokio::test]
    async fn test_file_labels_follow_policy() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("data.txt");
        std::fs::write(&file, b"x").unwrap();

        let relative = Source::file("some/where.txt", &PathPolicy::sending(false))
            .await
            .unwrap();
        assert_eq!(relative.label(), "some/where.txt");

        let absolute = Source::file(&file, &PathPolicy::sending(true)).await.unwrap();
        let expected = label_for(&file.canonicalize().unwrap()).unwrap();
        assert_eq!(absolute.label(), expected);
        assert!(absolute.label().ends_with("/data.txt"));

        let stdin = Source::from_arg(Path::new("-"), &PathPolicy::sending(false))
            .await
            .unwrap();
        assert_eq!(stdin.label(), STDIN_LABEL);
    }

    #[tokio::test]
    async fn test_send_over_delivers_all_sources() {
        let src_dir = tempfile::tempdir().unwrap();
        let base = tempfile::tempdir().unwrap();
        let file = src_dir.path().join("on_disk.bin");
        std::fs::write(&file, vec![7u8; 3000]).unwrap();

        let (client, server) = duplex(512);
        let handler = SessionHandler::new(
            Arc::new(Config::default()),
            Arc::new(PathPolicy::receiving(base.path().canonicalize().unwrap(), true)),
            None,
        );
        let session = tokio::spawn(handler.run(server));

        let sender = Sender::new(
            Config {
                chunk_size: 256,
                ..Config::default()
            },
            TcpTransport,
        );
        let sources = vec![
            Source::file(&file, &PathPolicy::sending(false)).await.unwrap(),
            Source::from_bytes("memo.txt", &b"in memory"[..]),
            Source::from_reader("piped", &b"unknown length"[..], ContentLength::Streamed),
        ];
        let stats = sender.send_over(client, None, sources).await.unwrap();

        assert_eq!(stats.units_completed, 3);
        assert_eq!(stats.payload_bytes, 3000 + 9 + 14);

        let report = session.await.unwrap();
        assert_eq!(report.status, SessionStatus::Complete);
        assert_eq!(report.stats.wire_bytes, stats.wire_bytes);
        assert_eq!(std::fs::read(base.path().join("on_disk.bin")).unwrap(), vec![7u8; 3000]);
        assert_eq!(std::fs::read(base.path().join("memo.txt")).unwrap(), b"in memory");
        assert_eq!(std::fs::read(base.path().join("piped")).unwrap(), b"unknown length");
    }

    #[tokio::test]
    async fn test_missing_file_aborts_with_bytes_written() {
        let (client, _server) = duplex(64 * 1024);
        let sender = Sender::new(Config::default(), TcpTransport);
        let sources = vec![
            Source::from_bytes("first", &b"12345"[..]),
            Source::file("/definitely/not/here.bin", &PathPolicy::sending(false))
                .await
                .unwrap(),
        ];

        let err = sender.send_over(client, None, sources).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LocalIo);
        // 첫 유닛 헤더(12 + 5) + 내용(5)
        assert_eq!(err.bytes_processed(), Some(22));
    }
}
