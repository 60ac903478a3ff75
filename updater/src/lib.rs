//! # Hearthstone-Script 업데이터 라이브러리
//!
//! 내려받은 릴리즈 패키지로 설치 디렉터리를 교체하는 업데이트 파이프라인입니다.
//!
//! ## 동작 원리
//! 1. 실행 중인 대상 프로그램이 종료될 때까지 대기 (시간 초과 시 강제 종료)
//! 2. 패키지를 설치 디렉터리 안의 스테이징 디렉터리에 압축 해제
//! 3. 설치 형태(JVM / 네이티브) 판별 → 보존 규칙 결정
//! 4. 오래된 라이브러리 정리 후 새 파일 복사 (사용자 설정/데이터와 플러그인은 보존)
//! 5. 새 업데이터가 포함되어 있으면 종료 후 교체 예약
//! 6. 스테이징 정리, 대상 프로그램 재시작
//!
//! ## 구성
//! - **오케스트레이터(orchestrator.rs)**: 단계 상태 머신, 진행률/결과 보고
//! - **파일 작업(fsops.rs)**: 압축 해제, 복사 계획/실행, 오래된 파일 정리
//! - **프로세스(process.rs)**: 종료 대기, 강제 종료, 잠금 보유자 탐지
//! - **설치 형태(layout.rs)**: `lib/*.jar` 유무로 판별
//! - **셀프 업데이트(handoff.rs)**: 백업 복사 + 종료 후 교체
//! - **진행 상태(progress.rs)**: 표시 계층 인터페이스와 채널 구현
//! - **릴리즈(release.rs, repository.rs)**: 버전 비교, GitHub/Gitee API

// ══════════════════════════════════════════════════════
// 모듈
// ══════════════════════════════════════════════════════

pub mod error;
pub mod fsops;
pub mod handoff;
pub mod layout;
pub mod orchestrator;
pub mod process;
pub mod progress;
pub mod release;
pub mod repository;
pub mod settings;

#[cfg(test)]
mod testkit;

// Re-exports for convenience
pub use error::{CopyFault, Result, UpdateError};
pub use handoff::{PostExitScheduler, ScriptedHandoff, SelfReplacePlan};
pub use layout::{classify_installation, LayoutKind, LayoutProfile};
pub use orchestrator::{Caveat, Orchestrator, Phase, UpdateReport};
pub use process::{DetachedLauncher, Launcher, ProcessControl, SystemProcesses};
pub use progress::{ChannelSink, NullSink, ProgressEvent, ProgressSink, Prompt, PromptAnswer};
pub use release::Release;
pub use repository::{ReleaseClient, Repository, SourceKind};
pub use settings::UpdateSettings;

use std::path::{Path, PathBuf};

// ══════════════════════════════════════════════════════
// 업데이트 요청
// ══════════════════════════════════════════════════════

/// 새 버전 파일의 위치
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadSource {
    /// zip 아카이브
    Archive(PathBuf),
    /// 이미 압축이 풀린 디렉터리
    Directory(PathBuf),
}

impl PayloadSource {
    /// 경로 하나로 판별: 디렉터리면 `Directory`, 그 외는 `Archive`
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if path.is_dir() {
            PayloadSource::Directory(path)
        } else {
            PayloadSource::Archive(path)
        }
    }

    /// 두 후보 중 하나 선택: 존재하는 디렉터리가 우선, 없으면 아카이브
    pub fn resolve(archive: Option<PathBuf>, directory: Option<PathBuf>) -> Option<Self> {
        match (archive, directory) {
            (_, Some(dir)) if dir.is_dir() => Some(PayloadSource::Directory(dir)),
            (Some(zip), _) => Some(PayloadSource::Archive(zip)),
            (None, Some(dir)) => Some(PayloadSource::Directory(dir)),
            (None, None) => None,
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            PayloadSource::Archive(p) | PayloadSource::Directory(p) => p,
        }
    }
}

/// 한 번의 업데이트 실행 입력. 생성 후 변경되지 않음
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateRequest {
    pub payload: PayloadSource,
    /// 현재 설치 디렉터리
    pub target_dir: PathBuf,
    /// 종료를 기다릴 대상 프로세스
    pub watched_pid: Option<u32>,
    /// 재시작한 프로그램에 `--pause=<값>`으로 전달
    pub pause_flag: Option<String>,
    /// 업데이트 후 재시작할 프로그램
    pub main_program: Option<PathBuf>,
}

impl UpdateRequest {
    pub fn new(payload: PayloadSource, target_dir: impl Into<PathBuf>) -> Self {
        Self {
            payload,
            target_dir: target_dir.into(),
            watched_pid: None,
            pause_flag: None,
            main_program: None,
        }
    }

    pub fn watch_pid(mut self, pid: u32) -> Self {
        self.watched_pid = Some(pid);
        self
    }

    pub fn pause(mut self, flag: impl Into<String>) -> Self {
        self.pause_flag = Some(flag.into());
        self
    }

    pub fn relaunch(mut self, program: impl Into<PathBuf>) -> Self {
        self.main_program = Some(program.into());
        self
    }

    /// 재시작 시 넘길 인자
    pub fn relaunch_args(&self) -> Vec<String> {
        self.pause_flag
            .iter()
            .map(|flag| format!("--pause={}", flag))
            .collect()
    }
}
