//! 명령행 인자

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::config::PathPolicy;
use crate::sender::Source;
use crate::{Config, Result, DEFAULT_LISTEN_ADDR, DEFAULT_PORT};

/// skiff - 신뢰성 있는 스트림 위의 다중 파일 전송
#[derive(Debug, Parser)]
#[command(name = "skiff", version, about)]
pub struct Cli {
    /// TOML 설정 파일 (명령행 인자가 우선)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// 로그 상세도 (-v: debug, -vv: trace). RUST_LOG 가 있으면 그쪽이 우선
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// 파일 전송 (파일이 없으면 표준 입력)
    Send(SendArgs),
    /// 파일 수신
    Receive(ReceiveArgs),
}

#[derive(Debug, Args)]
pub struct SendArgs {
    /// 수신측 호스트
    #[arg(short, long)]
    pub address: String,

    /// 수신측 포트
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// 정규화된 절대 경로를 선언
    #[arg(long)]
    pub absolute: bool,

    /// 보낼 파일 (`-`는 표준 입력)
    #[arg(value_name = "FILE")]
    pub files: Vec<PathBuf>,
}

impl SendArgs {
    /// 연결할 `host:port` (IPv6 리터럴은 대괄호로 감싼다)
    pub fn destination(&self) -> String {
        if self.address.contains(':') && !self.address.starts_with('[') {
            format!("[{}]:{}", self.address, self.port)
        } else {
            format!("{}:{}", self.address, self.port)
        }
    }

    pub fn policy(&self) -> PathPolicy {
        PathPolicy::sending(self.absolute)
    }

    /// 인자 순서대로 입력 목록 생성
    pub async fn sources(&self) -> Result<Vec<Source>> {
        if self.files.is_empty() {
            return Ok(vec![Source::stdin()]);
        }

        let policy = self.policy();
        let mut sources = Vec::with_capacity(self.files.len());
        for file in &self.files {
            sources.push(Source::from_arg(file, &policy).await?);
        }
        Ok(sources)
    }
}

#[derive(Debug, Args)]
pub struct ReceiveArgs {
    /// 바인드 주소
    #[arg(short, long, default_value = DEFAULT_LISTEN_ADDR)]
    pub address: String,

    /// 기준 디렉토리
    #[arg(short, long, value_name = "DIR", default_value = "/")]
    pub dir: PathBuf,

    /// 경로를 버리고 파일 이름만 사용
    #[arg(long)]
    pub strip: bool,

    /// 최대 동시 세션 수
    #[arg(long, value_name = "N")]
    pub max_sessions: Option<usize>,

    /// 유휴 타임아웃 (초)
    #[arg(long, value_name = "SECS")]
    pub idle_timeout: Option<u64>,

    /// 종료 유예 시간 (초)
    #[arg(long, value_name = "SECS")]
    pub grace: Option<u64>,
}

impl ReceiveArgs {
    /// 명령행 값으로 설정 덮어쓰기
    pub fn apply(&self, config: &mut Config) {
        if let Some(max_sessions) = self.max_sessions {
            config.max_sessions = max_sessions;
        }
        if let Some(secs) = self.idle_timeout {
            config.idle_timeout_ms = secs.saturating_mul(1000);
        }
        if let Some(secs) = self.grace {
            config.shutdown_grace_ms = secs.saturating_mul(1000);
        }
    }

    pub fn policy(&self) -> PathPolicy {
        PathPolicy::receiving(self.dir.clone(), self.strip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_defaults() {
        let cli = Cli::try_parse_from(["skiff", "send", "-a", "example.org", "a.txt", "-"]).unwrap();
        let Command::Send(args) = cli.command else {
            panic!("expected send");
        };
        assert_eq!(args.port, DEFAULT_PORT);
        assert!(!args.absolute);
        assert_eq!(args.files, vec![PathBuf::from("a.txt"), PathBuf::from("-")]);
        assert_eq!(args.destination(), format!("example.org:{}", DEFAULT_PORT));
    }

    #[test]
    fn test_send_requires_address() {
        assert!(Cli::try_parse_from(["skiff", "send", "a.txt"]).is_err());
    }

    #[test]
    fn test_ipv6_destination_is_bracketed() {
        let cli = Cli::try_parse_from(["skiff", "send", "-a", "::1", "-p", "7000"]).unwrap();
        let Command::Send(args) = cli.command else {
            panic!("expected send");
        };
        assert_eq!(args.destination(), "[::1]:7000");
    }

    #[tokio::test]
    async fn test_no_files_means_stdin() {
        let cli = Cli::try_parse_from(["skiff", "send", "-a", "host"]).unwrap();
        let Command::Send(args) = cli.command else {
            panic!("expected send");
        };
        let sources = args.sources().await.unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].label(), crate::STDIN_LABEL);
    }

    #[test]
    fn test_receive_overrides_config() {
        let cli = Cli::try_parse_from([
            "skiff",
            "-vv",
            "receive",
            "-d",
            "/srv/in",
            "--strip",
            "--max-sessions",
            "3",
            "--idle-timeout",
            "2",
            "--grace",
            "1",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Command::Receive(args) = cli.command else {
            panic!("expected receive");
        };
        assert_eq!(args.address, DEFAULT_LISTEN_ADDR);

        let mut config = Config::default();
        args.apply(&mut config);
        assert_eq!(config.max_sessions, 3);
        assert_eq!(config.idle_timeout_ms, 2000);
        assert_eq!(config.shutdown_grace_ms, 1000);

        let policy = args.policy();
        assert!(policy.strip_paths);
        assert_eq!(policy.base_directory, PathBuf::from("/srv/in"));
    }
}
