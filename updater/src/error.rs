//! 업데이트 파이프라인 에러 타입
//!
//! ## 에러 분류
//! - **설정 오류**: 업데이트 패키지/대상 디렉터리 누락 → 즉시 중단, 재시도 없음
//! - **파일 잠금**: 다른 프로세스가 파일을 점유 → 재시도/건너뛰기로 복구
//! - **압축/무결성 오류**: 손상된 아카이브, zip-slip → 중단 + 스테이징 정리
//! - **프로세스 제어 오류**: 대상 프로세스 종료 실패 → 중단
//!
//! 종료 후 정리 실패, 재시작 실패 같은 "성공 후 경고"는 에러가 아니라
//! [`crate::orchestrator::Caveat`]로 전달됩니다.

use std::io;
use std::path::{Path, PathBuf};

use crate::orchestrator::Phase;

/// 업데이트 파이프라인 에러
#[derive(thiserror::Error, Debug)]
pub enum UpdateError {
    #[error("update payload not found: {0}")]
    PayloadMissing(PathBuf),

    #[error("target directory not found: {0}")]
    TargetMissing(PathBuf),

    #[error("target directory is empty: {0}")]
    TargetEmpty(PathBuf),

    #[error("archive entry escapes extraction root: {entry}")]
    ZipSlip { entry: String },

    #[error("corrupt archive {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("I/O error during {operation} on '{path}': {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to kill process {pid}: {reason}")]
    ProcessKill { pid: u32, reason: String },

    #[error("update aborted by user at {0}")]
    Aborted(PathBuf),

    #[error("invalid pipeline transition: {from:?} -> {to:?}")]
    InvalidTransition { from: Phase, to: Phase },

    #[error("repository error: {0}")]
    Repository(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl UpdateError {
    /// IO 에러에 작업명과 경로를 붙여 변환
    pub fn io(operation: &'static str, path: &Path, source: io::Error) -> Self {
        UpdateError::Io {
            operation,
            path: path.to_path_buf(),
            source,
        }
    }

    /// 설정 오류인지 확인 (재시도 의미 없음)
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            UpdateError::PayloadMissing(_)
                | UpdateError::TargetMissing(_)
                | UpdateError::TargetEmpty(_)
                | UpdateError::Config(_)
        )
    }

    /// 아카이브 무결성 오류인지 확인
    pub fn is_integrity_error(&self) -> bool {
        matches!(self, UpdateError::ZipSlip { .. } | UpdateError::Archive { .. })
    }
}

pub type Result<T, E = UpdateError> = std::result::Result<T, E>;

/// 파일 한 개 복사 실패 원인. 잠금과 그 외 IO 오류를 구분
#[derive(Debug)]
pub enum CopyFault {
    /// 공유 위반: 다른 프로세스가 대상 파일을 열고 있음
    Locked(io::Error),
    Io(io::Error),
}

impl CopyFault {
    /// 운영체제 에러를 잠금 여부에 따라 분류
    pub fn classify(err: io::Error, destination_exists: bool) -> Self {
        if is_lock_violation(&err, destination_exists) {
            CopyFault::Locked(err)
        } else {
            CopyFault::Io(err)
        }
    }
}

impl std::fmt::Display for CopyFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CopyFault::Locked(e) => write!(f, "locked: {}", e),
            CopyFault::Io(e) => write!(f, "{}", e),
        }
    }
}

/// 공유 위반(파일 잠금) 판정
///
/// - Windows: ERROR_SHARING_VIOLATION(32), ERROR_LOCK_VIOLATION(33),
///   기존 파일에 대한 ERROR_ACCESS_DENIED(5)
/// - Unix: 실행 중인 바이너리에 쓰기 시 ETXTBSY
#[cfg(windows)]
fn is_lock_violation(err: &io::Error, destination_exists: bool) -> bool {
    match err.raw_os_error() {
        Some(32) | Some(33) => true,
        Some(5) => destination_exists,
        _ => false,
    }
}

#[cfg(unix)]
fn is_lock_violation(err: &io::Error, _destination_exists: bool) -> bool {
    err.raw_os_error() == Some(nix::errno::Errno::ETXTBSY as i32)
}

#[cfg(not(any(windows, unix)))]
fn is_lock_violation(_err: &io::Error, _destination_exists: bool) -> bool {
    false
}
