//! 셀프 업데이트 — 실행 중인 업데이터 자신의 실행 파일 교체
//!
//! 실행 중인 바이너리는 덮어쓸 수 없으므로:
//! 1. 스테이징된 새 업데이터를 `<현재 경로><접미사>` (기본 `.bak`)로 복사
//! 2. 업데이터 옆에 교체 스크립트를 쓰고 분리 실행
//!    (업데이터 PID가 사라질 때까지 대기 → 잠시 대기 → 현재 파일 삭제
//!    → 백업을 현재 이름으로 이동 → 스크립트 자신 삭제)
//!
//! 예약 실패는 업데이트 실패가 아니며 경고로만 남습니다.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use crate::error::{Result, UpdateError};
use crate::fsops;

#[cfg(windows)]
const SCRIPT_NAME: &str = "_hs_updater_handoff.cmd";
#[cfg(not(windows))]
const SCRIPT_NAME: &str = "_hs_updater_handoff.sh";

/// 종료 후 교체 계획
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfReplacePlan {
    /// 지금 실행 중인 업데이터 경로
    pub current: PathBuf,
    /// 새 업데이터가 복사된 백업 경로
    pub replacement: PathBuf,
    /// 종료를 기다릴 업데이터 프로세스
    pub parent_pid: u32,
    /// 프로세스 종료 확인 후 교체 전 추가 대기
    pub delay: Duration,
}

/// "내 프로세스가 끝난 뒤 실행할 작업" 예약 인터페이스
pub trait PostExitScheduler: Send + Sync {
    fn schedule(&self, plan: &SelfReplacePlan) -> Result<()>;
}

/// 스테이징된 페이로드에서 새 업데이터를 찾아 백업 경로에 복사
///
/// 같은 이름의 파일이 없으면 `Ok(None)` (셀프 업데이트 불필요).
/// 백업 경로는 실행 중인 경로가 아니므로 복사 시 자기 자신 건너뛰기 규칙을 적용하지 않습니다.
pub fn prepare_self_update(
    staged_root: &Path,
    current_exe: &Path,
    backup_suffix: &str,
    delay: Duration,
) -> Result<Option<SelfReplacePlan>> {
    let Some(exe_name) = current_exe.file_name() else {
        return Ok(None);
    };
    let Some(new_exe) = fsops::find_file(staged_root, exe_name) else {
        tracing::info!("[SelfUpdate] No new updater in payload");
        return Ok(None);
    };

    let replacement = backup_path(current_exe, backup_suffix);
    if replacement.exists() {
        fs::remove_file(&replacement)
            .map_err(|e| UpdateError::io("remove stale backup", &replacement, e))?;
    }
    fs::copy(&new_exe, &replacement).map_err(|e| UpdateError::io("copy updater", &replacement, e))?;
    tracing::info!(
        "[SelfUpdate] New updater staged at {}",
        replacement.display()
    );

    Ok(Some(SelfReplacePlan {
        current: current_exe.to_path_buf(),
        replacement,
        parent_pid: std::process::id(),
        delay,
    }))
}

/// `hs-updater.exe` + `.bak` → `hs-updater.exe.bak`
pub fn backup_path(current_exe: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = current_exe.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

/// 교체 스크립트 위치 (업데이터와 같은 디렉터리)
pub fn script_path(plan: &SelfReplacePlan) -> PathBuf {
    match plan.current.parent().filter(|d| !d.as_os_str().is_empty()) {
        Some(dir) => dir.join(SCRIPT_NAME),
        None => std::env::temp_dir().join(SCRIPT_NAME),
    }
}

/// 교체 스크립트를 쓰고 운영체제 셸로 분리 실행하는 기본 구현
#[derive(Debug, Default, Clone, Copy)]
pub struct ScriptedHandoff;

impl PostExitScheduler for ScriptedHandoff {
    fn schedule(&self, plan: &SelfReplacePlan) -> Result<()> {
        let script = script_path(plan);
        fs::write(&script, handoff_script(plan))
            .map_err(|e| UpdateError::io("write handoff script", &script, e))?;

        let mut cmd = handoff_command(&script, plan);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| UpdateError::io("schedule self-update", &script, e))?;

        tracing::info!(
            "[SelfUpdate] Replacement scheduled after PID {} exits: {} → {}",
            plan.parent_pid,
            plan.replacement.display(),
            plan.current.display()
        );
        Ok(())
    }
}

#[cfg(windows)]
pub fn handoff_script(plan: &SelfReplacePlan) -> String {
    // tasklist 결과에 PID가 없으면 find 실패 → 대기 종료
    // ping 횟수 = 대기 초 + 1 (첫 응답은 즉시)
    format!(
        "@echo off\r\n\
:wait\r\n\
tasklist /FI \"PID eq {pid}\" /NH 2>nul | find \"{pid}\" >nul\r\n\
if not errorlevel 1 (\r\n\
    ping -n 2 127.0.0.1 >nul\r\n\
    goto wait\r\n\
)\r\n\
ping -n {pings} 127.0.0.1 >nul\r\n\
del /f /q \"{current}\"\r\n\
move /y \"{replacement}\" \"{current}\" >nul\r\n\
(goto) 2>nul & del \"%~f0\"\r\n",
        pid = plan.parent_pid,
        pings = plan.delay.as_secs() + 1,
        current = plan.current.display(),
        replacement = plan.replacement.display(),
    )
}

#[cfg(windows)]
fn handoff_command(script: &Path, _plan: &SelfReplacePlan) -> Command {
    use std::os::windows::process::CommandExt;
    const CREATE_NO_WINDOW: u32 = 0x08000000;
    const DETACHED_PROCESS: u32 = 0x00000008;

    let mut cmd = Command::new("cmd");
    cmd.arg("/c")
        .arg(script)
        .creation_flags(CREATE_NO_WINDOW | DETACHED_PROCESS);
    cmd
}

/// 경로는 위치 인자(`$1` 현재, `$2` 백업)로 전달
#[cfg(not(windows))]
pub fn handoff_script(plan: &SelfReplacePlan) -> String {
    format!(
        "#!/bin/sh\n\
while kill -0 {pid} 2>/dev/null; do sleep 1; done\n\
sleep {delay}\n\
rm -f \"$1\"\n\
mv -f \"$2\" \"$1\"\n\
rm -f \"$0\"\n",
        pid = plan.parent_pid,
        delay = plan.delay.as_secs(),
    )
}

#[cfg(not(windows))]
fn handoff_command(script: &Path, plan: &SelfReplacePlan) -> Command {
    use std::os::unix::process::CommandExt;

    let mut cmd = Command::new("sh");
    cmd.arg(script)
        .arg(&plan.current)
        .arg(&plan.replacement)
        .process_group(0);
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backup_path_appends_suffix() {
        assert_eq!(
            backup_path(Path::new("/opt/hs/hs-updater.exe"), ".bak"),
            PathBuf::from("/opt/hs/hs-updater.exe.bak")
        );
    }

    #[test]
    fn no_updater_in_payload_means_no_plan() {
        let dir = tempfile::tempdir().unwrap();
        let staged = dir.path().join("staged");
        fs::create_dir_all(&staged).unwrap();
        fs::write(staged.join("app.exe"), "x").unwrap();
        let current = dir.path().join("hs-updater.exe");
        fs::write(&current, "old").unwrap();

        let plan = prepare_self_update(&staged, &current, ".bak", Duration::from_secs(2)).unwrap();
        assert!(plan.is_none());
        assert!(!dir.path().join("hs-updater.exe.bak").exists());
    }

    #[test]
    fn stale_backup_is_replaced_by_new_updater() {
        let dir = tempfile::tempdir().unwrap();
        let staged = dir.path().join("staged");
        fs::create_dir_all(staged.join("bin")).unwrap();
        fs::write(staged.join("bin/hs-updater.exe"), "new").unwrap();
        let current = dir.path().join("hs-updater.exe");
        fs::write(&current, "old").unwrap();
        fs::write(dir.path().join("hs-updater.exe.bak"), "stale").unwrap();

        let plan = prepare_self_update(&staged, &current, ".bak", Duration::from_secs(2))
            .unwrap()
            .unwrap();
        assert_eq!(plan.current, current);
        assert_eq!(fs::read_to_string(&plan.replacement).unwrap(), "new");
        assert_eq!(fs::read_to_string(&current).unwrap(), "old");
    }

    fn plan_in(dir: &Path, parent_pid: u32) -> SelfReplacePlan {
        SelfReplacePlan {
            current: dir.join("hs updater"),
            replacement: dir.join("hs updater.bak"),
            parent_pid,
            delay: Duration::ZERO,
        }
    }

    #[test]
    fn prepared_plan_waits_on_this_process() {
        let dir = tempfile::tempdir().unwrap();
        let staged = dir.path().join("staged");
        fs::create_dir_all(&staged).unwrap();
        fs::write(staged.join("hs-updater.exe"), "new").unwrap();
        let current = dir.path().join("hs-updater.exe");
        fs::write(&current, "old").unwrap();

        let plan = prepare_self_update(&staged, &current, ".bak", Duration::from_secs(2))
            .unwrap()
            .unwrap();
        assert_eq!(plan.parent_pid, std::process::id());
    }

    #[test]
    fn script_waits_for_parent_before_replacing() {
        let dir = tempfile::tempdir().unwrap();
        let script = handoff_script(&plan_in(dir.path(), 4242));

        #[cfg(windows)]
        let (wait, replace) = ("PID eq 4242", "del /f /q");
        #[cfg(not(windows))]
        let (wait, replace) = ("while kill -0 4242", "rm -f \"$1\"");

        let wait_at = script.find(wait).expect("script must wait on the parent PID");
        let replace_at = script.find(replace).expect("script must replace the updater");
        assert!(wait_at < replace_at);
    }

    #[test]
    fn script_lives_next_to_updater() {
        let dir = tempfile::tempdir().unwrap();
        let plan = plan_in(dir.path(), 1);
        assert_eq!(script_path(&plan).parent(), Some(dir.path()));
    }

    #[cfg(unix)]
    #[test]
    fn scripted_handoff_replaces_only_after_parent_exits() {
        let dir = tempfile::tempdir().unwrap();
        let mut parent = Command::new("sleep").arg("1").spawn().unwrap();
        let plan = plan_in(dir.path(), parent.id());
        fs::write(&plan.current, "old").unwrap();
        fs::write(&plan.replacement, "new").unwrap();

        ScriptedHandoff.schedule(&plan).unwrap();

        std::thread::sleep(Duration::from_millis(300));
        assert_eq!(fs::read_to_string(&plan.current).unwrap(), "old");
        assert!(plan.replacement.exists());

        // 회수해야 kill -0 이 실패함
        parent.wait().unwrap();
        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        while plan.replacement.exists() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(50));
        }
        assert_eq!(fs::read_to_string(&plan.current).unwrap(), "new");
        assert!(!plan.replacement.exists());

        let script = script_path(&plan);
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while script.exists() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(50));
        }
        assert!(!script.exists());
    }
}
