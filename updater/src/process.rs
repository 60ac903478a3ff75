//! 프로세스 조정 — 대상 프로세스 종료 대기, 강제 종료, 파일 잠금 보유자 탐지
//!
//! 운영체제 API는 [`ProcessControl`] 뒤로 숨겨져 있고 파이프라인은 이 trait만 사용합니다.
//! 실제 백엔드는 [`SystemProcesses`] (sysinfo 기반 조회 + 플랫폼별 kill)입니다.

use std::path::Path;
use std::time::{Duration, Instant};

use sysinfo::{Pid, System};

use crate::error::{Result, UpdateError};
use crate::progress::{Prompt, PromptAnswer, ProgressSink};

/// 실행 중인 프로세스 요약
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
}

impl std::fmt::Display for ProcessInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (PID {})", self.name, self.pid)
    }
}

/// 프로세스 제어 인터페이스
pub trait ProcessControl: Send + Sync {
    fn is_alive(&self, pid: u32) -> bool;
    fn kill(&self, pid: u32) -> Result<()>;
    /// 이름이 일치하는 모든 프로세스 강제 종료. 종료한 개수 반환
    fn kill_by_name(&self, name: &str) -> Result<usize>;
    /// 파일을 잡고 있을 가능성이 있는 프로세스 (휴리스틱)
    fn find_holders_of(&self, path: &Path) -> Vec<ProcessInfo>;
}

// ══════════════════════════════════════════════════════
// 시스템 백엔드
// ══════════════════════════════════════════════════════

/// sysinfo + 플랫폼 kill 기반 실제 구현
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcesses;

impl SystemProcesses {
    fn snapshot() -> Vec<ProcessInfo> {
        let mut sys = System::new();
        sys.refresh_processes();
        sys.processes()
            .iter()
            .map(|(pid, process)| ProcessInfo {
                pid: pid.as_u32(),
                name: process.name().to_string(),
            })
            .collect()
    }
}

impl ProcessControl for SystemProcesses {
    fn is_alive(&self, pid: u32) -> bool {
        let mut sys = System::new();
        sys.refresh_processes();
        sys.process(Pid::from_u32(pid)).is_some()
    }

    fn kill(&self, pid: u32) -> Result<()> {
        force_kill_pid(pid)
    }

    fn kill_by_name(&self, name: &str) -> Result<usize> {
        let own_pid = std::process::id();
        let targets: Vec<ProcessInfo> = Self::snapshot()
            .into_iter()
            .filter(|p| process_name_matches(&p.name, name) && p.pid != own_pid)
            .collect();
        Ok(kill_each(self, &targets))
    }

    fn find_holders_of(&self, path: &Path) -> Vec<ProcessInfo> {
        let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().to_lowercase()) else {
            return Vec::new();
        };
        if stem.is_empty() {
            return Vec::new();
        }
        let own_pid = std::process::id();
        Self::snapshot()
            .into_iter()
            .filter(|p| p.pid != own_pid && p.name.to_lowercase().contains(&stem))
            .collect()
    }
}

/// 목록의 프로세스를 하나씩 강제 종료하고 종료된 개수 반환
///
/// 조회와 종료 사이에 스스로 끝난 프로세스는 종료된 것으로 칩니다.
/// 끝내지 못한 프로세스는 경고만 남기고 다음으로 넘어갑니다.
pub fn kill_each(procs: &dyn ProcessControl, targets: &[ProcessInfo]) -> usize {
    let mut closed = 0;
    for process in targets {
        tracing::info!("[Process] Killing {} by name", process);
        match procs.kill(process.pid) {
            Ok(()) => closed += 1,
            Err(e) if !procs.is_alive(process.pid) => {
                tracing::debug!("[Process] {} exited before kill: {}", process, e);
                closed += 1;
            }
            Err(e) => tracing::warn!("[Process] Could not kill {}: {}", process, e),
        }
    }
    closed
}

/// `game` 과 `game.exe` 를 같은 이름으로 취급 (대소문자 무시)
fn process_name_matches(process_name: &str, wanted: &str) -> bool {
    let strip = |s: &str| {
        let lower = s.to_lowercase();
        lower.strip_suffix(".exe").map(str::to_string).unwrap_or(lower)
    };
    strip(process_name) == strip(wanted)
}

/// PID 강제 종료
fn force_kill_pid(pid: u32) -> Result<()> {
    #[cfg(target_os = "windows")]
    {
        use std::os::windows::process::CommandExt;
        const CREATE_NO_WINDOW: u32 = 0x08000000;
        let output = std::process::Command::new("taskkill")
            .args(["/F", "/PID", &pid.to_string()])
            .creation_flags(CREATE_NO_WINDOW)
            .output()
            .map_err(|e| UpdateError::ProcessKill {
                pid,
                reason: e.to_string(),
            })?;
        if !output.status.success() {
            return Err(UpdateError::ProcessKill {
                pid,
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
    }
    #[cfg(unix)]
    {
        use nix::errno::Errno;
        use nix::sys::signal::{kill, Signal};

        match kill(nix::unistd::Pid::from_raw(pid as i32), Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(e) => {
                return Err(UpdateError::ProcessKill {
                    pid,
                    reason: e.to_string(),
                })
            }
        }
    }
    Ok(())
}

/// 업데이트 후 메인 프로그램 실행
pub trait Launcher: Send + Sync {
    /// 분리 실행하고 PID 반환
    fn launch(&self, program: &Path, args: &[String]) -> std::io::Result<u32>;
}

/// 부모와 분리된 새 프로세스로 실행
#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedLauncher;

impl Launcher for DetachedLauncher {
    fn launch(&self, program: &Path, args: &[String]) -> std::io::Result<u32> {
        let mut cmd = std::process::Command::new(program);
        cmd.args(args)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null());
        if let Some(dir) = program.parent().filter(|d| !d.as_os_str().is_empty()) {
            cmd.current_dir(dir);
        }

        #[cfg(target_os = "windows")]
        {
            use std::os::windows::process::CommandExt;
            // DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP
            cmd.creation_flags(0x00000008 | 0x00000200);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let child = cmd.spawn()?;
        tracing::info!("[Process] Launched {} (PID {})", program.display(), child.id());
        Ok(child.id())
    }
}

// ══════════════════════════════════════════════════════
// 종료 대기
// ══════════════════════════════════════════════════════

/// 종료 대기 파라미터
#[derive(Debug, Clone, Copy)]
pub struct WaitPolicy {
    pub max_wait: Duration,
    pub poll_interval: Duration,
    pub report_every: Duration,
    pub kill_settle: Duration,
}

/// 종료 대기 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// 처음부터 실행 중이 아니었음
    NotRunning,
    /// 제한 시간 안에 스스로 종료
    Exited,
    /// 시간 초과 후 강제 종료
    Killed,
}

/// 프로세스가 종료될 때까지 대기, 시간 초과 시 강제 종료
///
/// `on_waiting`은 대략 `report_every` 간격으로 경과 시간과 함께 호출됩니다.
/// 시간 초과 자체는 실패가 아니며, 종료시키지 못한 경우에만 에러를 반환합니다.
pub fn wait_for_exit(
    procs: &dyn ProcessControl,
    pid: u32,
    policy: &WaitPolicy,
    on_waiting: &mut dyn FnMut(Duration),
) -> Result<ExitOutcome> {
    if !procs.is_alive(pid) {
        tracing::info!("[Process] PID {} is not running", pid);
        return Ok(ExitOutcome::NotRunning);
    }

    let start = Instant::now();
    let mut last_report = start;
    while start.elapsed() < policy.max_wait {
        std::thread::sleep(policy.poll_interval);
        if !procs.is_alive(pid) {
            tracing::info!("[Process] PID {} exited after {:?}", pid, start.elapsed());
            return Ok(ExitOutcome::Exited);
        }
        if last_report.elapsed() >= policy.report_every {
            last_report = Instant::now();
            on_waiting(start.elapsed());
        }
    }

    tracing::warn!("[Process] PID {} still running after {:?}, killing", pid, policy.max_wait);
    if let Err(e) = procs.kill(pid) {
        // 마지막 조회와 kill 사이에 스스로 종료된 경우
        if !procs.is_alive(pid) {
            tracing::info!("[Process] PID {} exited before kill: {}", pid, e);
            return Ok(ExitOutcome::Killed);
        }
        return Err(e);
    }
    std::thread::sleep(policy.kill_settle);
    if procs.is_alive(pid) {
        return Err(UpdateError::ProcessKill {
            pid,
            reason: "process still running after kill".into(),
        });
    }
    Ok(ExitOutcome::Killed)
}

// ══════════════════════════════════════════════════════
// 파일 잠금 충돌
// ══════════════════════════════════════════════════════

/// 잠금 충돌 처리 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockResolution {
    Retry,
    Skip,
    Abort,
}

/// 잠금 충돌 처리 파라미터
#[derive(Debug, Clone, Copy)]
pub struct LockPolicy {
    pub prompt_timeout: Duration,
    pub retry_delay: Duration,
    pub kill_settle: Duration,
}

/// 파일을 잡고 있을 가능성이 있는 프로세스 탐색 (없으면 빈 목록)
pub fn detect_lock_holders(procs: &dyn ProcessControl, path: &Path) -> Vec<ProcessInfo> {
    let holders = procs.find_holders_of(path);
    tracing::debug!("[Lock] {} candidate holder(s) for {}", holders.len(), path.display());
    holders
}

/// 공유 위반으로 복사가 실패한 파일 처리
///
/// 시간 초과 시 기본값은 항상 진행 쪽(재시도 또는 종료 후 재시도)이므로 무인 실행이
/// 멈추지 않습니다. `No`는 이 파일만 건너뛰고, `Abort`만 업데이트 전체를 중단합니다.
pub fn resolve_lock_conflict(
    procs: &dyn ProcessControl,
    prompt: &dyn Prompt,
    sink: &dyn ProgressSink,
    path: &Path,
    policy: &LockPolicy,
) -> LockResolution {
    let holders = detect_lock_holders(procs, path);

    if holders.is_empty() {
        let question = format!(
            "{} is locked by another program.\nClose it and retry? (no = skip this file)",
            path.display()
        );
        return match prompt.ask(&question, policy.prompt_timeout) {
            PromptAnswer::Yes | PromptAnswer::TimedOut => {
                sink.append_detail(&format!("Retrying locked file {}", path.display()));
                std::thread::sleep(policy.retry_delay);
                LockResolution::Retry
            }
            PromptAnswer::No => LockResolution::Skip,
            PromptAnswer::Abort => LockResolution::Abort,
        };
    }

    let names: Vec<String> = holders.iter().map(ToString::to_string).collect();
    let question = format!(
        "{} is in use by:\n  {}\nKill these processes and retry?",
        path.display(),
        names.join("\n  ")
    );
    match prompt.ask(&question, policy.prompt_timeout) {
        PromptAnswer::Yes | PromptAnswer::TimedOut => {
            for holder in &holders {
                sink.append_detail(&format!("Killing {}", holder));
                if let Err(e) = procs.kill(holder.pid) {
                    tracing::warn!("[Lock] Could not kill {}: {}", holder, e);
                }
            }
            std::thread::sleep(policy.kill_settle);
            LockResolution::Retry
        }
        PromptAnswer::No => LockResolution::Skip,
        PromptAnswer::Abort => LockResolution::Abort,
    }
}
