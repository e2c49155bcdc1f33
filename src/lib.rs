//! # skiff
//!
//! 신뢰성 있고 순서가 보장되는 스트림 위의 점대점 다중 파일 전송
//!
//! ## 핵심 특징
//! - **프레이밍**: 연결 하나에 파일 유닛(헤더 + 내용)을 연달아 전송
//! - **스트리밍 유닛**: 길이를 모르는 입력(stdin)은 서브프레임으로 전송
//! - **경로 정책**: 원격 경로는 기준 디렉토리 밖으로 나갈 수 없음
//! - **원자적 쓰기**: 임시 파일에 쓰고 완료 시 rename
//! - **세션 격리**: 세션 하나의 실패가 다른 세션에 영향 없음
//! - **동시 세션 제한**: 세마포어 기반 수락 제어, 유예 시간이 있는 종료

pub mod cli;
pub mod codec;
pub mod config;
pub mod error;
pub mod receiver;
pub mod resolver;
pub mod sender;
pub mod session;
pub mod staging;
pub mod stats;
pub mod transport;

pub use codec::{ContentLength, FrameReader, FrameWriter, UnitHeader};
pub use config::{Config, PathPolicy};
pub use error::{Error, ErrorKind, Result};
pub use receiver::Receiver;
pub use sender::{Sender, Source};
pub use session::{SessionHandler, SessionReport, SessionStatus, UnitReport, UnitStatus};
pub use stats::{ReceiverStats, TransferStats};
pub use transport::{Acceptor, TcpTransport, Transport};

/// 기본 청크 크기 (바이트)
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024; // 64KB

/// 기본 최대 경로 길이 (바이트)
pub const MAX_PATH_LEN: u32 = 4096;

/// 기본 포트
pub const DEFAULT_PORT: u16 = 9876;

/// 수신측 기본 바인드 주소
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:9876";

/// 표준 입력 유닛의 경로 라벨
pub const STDIN_LABEL: &str = "stdin";
