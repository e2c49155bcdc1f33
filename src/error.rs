//! 에러 타입 정의

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// 에러 분류
///
/// 세션/유닛 중단 범위를 결정할 때 사용
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 연결 수준 실패 (해당 세션만 종료)
    Transport,
    /// 잘못되거나 잘린 프레이밍
    Protocol,
    /// 기준 디렉토리 밖으로 벗어나는 경로
    PathTraversal,
    /// 사용할 수 없는 경로
    InvalidPath,
    /// 로컬 디스크 에러 (용량 부족, 권한 등)
    LocalIo,
    /// 잘못된 설정
    Config,
}

/// skiff 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("전송 계층 에러 ({context}): {source}")]
    Transport {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("유휴 타임아웃: {idle:?} 동안 수신 없음")]
    IdleTimeout { idle: Duration },

    #[error("프로토콜 에러: {0}")]
    Protocol(String),

    #[error("경로 이탈 거부: {path:?}")]
    PathTraversal { path: String },

    #[error("유효하지 않은 경로 {path:?}: {reason}")]
    InvalidPath { path: String, reason: &'static str },

    #[error("로컬 IO 에러 ({}): {source}", path.display())]
    LocalIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("설정 에러: {0}")]
    Config(String),

    #[error("세션 중단 ({bytes} bytes 처리 후): {source}")]
    Aborted {
        bytes: u64,
        peer: Option<SocketAddr>,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// 전송 계층 에러 생성
    pub fn transport(context: impl Into<String>, source: std::io::Error) -> Self {
        Error::Transport {
            context: context.into(),
            source,
        }
    }

    /// 로컬 IO 에러 생성
    pub fn local_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::LocalIo {
            path: path.into(),
            source,
        }
    }

    /// 처리된 바이트 수와 피어 정보를 붙여 감싼다
    pub fn aborted(self, bytes: u64, peer: Option<SocketAddr>) -> Self {
        Error::Aborted {
            bytes,
            peer,
            source: Box::new(self),
        }
    }

    /// 에러 분류 반환 (`Aborted`는 원인 에러의 분류)
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Transport { .. } | Error::IdleTimeout { .. } => ErrorKind::Transport,
            Error::Protocol(_) => ErrorKind::Protocol,
            Error::PathTraversal { .. } => ErrorKind::PathTraversal,
            Error::InvalidPath { .. } => ErrorKind::InvalidPath,
            Error::LocalIo { .. } => ErrorKind::LocalIo,
            Error::Config(_) => ErrorKind::Config,
            Error::Aborted { source, .. } => source.kind(),
        }
    }

    /// 중단 시점까지 처리된 바이트 수
    pub fn bytes_processed(&self) -> Option<u64> {
        match self {
            Error::Aborted { bytes, .. } => Some(*bytes),
            _ => None,
        }
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aborted_keeps_inner_kind() {
        let err = Error::Protocol("truncated header".into()).aborted(42, None);
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert_eq!(err.bytes_processed(), Some(42));
        assert!(err.to_string().contains("42 bytes"));
    }

    #[test]
    fn test_timeout_is_transport() {
        let err = Error::IdleTimeout {
            idle: Duration::from_secs(3),
        };
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert_eq!(err.bytes_processed(), None);
    }
}
