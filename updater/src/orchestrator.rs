//! 업데이트 오케스트레이터 — 단계가 고정된 업데이트 파이프라인
//!
//! ```text
//! Init → AwaitTargetExit → ValidatePreconditions → StageExtract → Classify
//!      → ApplyFiles → SelfUpdateHandoff → Cleanup → Relaunch → Countdown → Terminal
//! ```
//!
//! 되돌아가는 전이는 없고, 치명적 오류가 나면 어느 단계에서든 `Aborted`로 빠집니다.
//! 한 번의 실행에서 `show_error` 또는 `show_success` 중 정확히 하나만 호출됩니다.
//!
//! ## 진행률 (0–100)
//! | 단계 | 값 |
//! |------|----|
//! | 준비 | 5 |
//! | 대상 종료 대기 | 10 |
//! | 사전 조건 확인 | 15 |
//! | 압축 해제 | 20 → 30 |
//! | 설치 형태 판별 | 50 |
//! | 오래된 파일 정리 | 60 |
//! | 파일 복사 | 60 → 90 (파일 수에 비례) |
//! | 셀프 업데이트 / 정리 | 92 / 95 |
//! | 완료 | 100 |

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, UpdateError};
use crate::fsops::{self, CopyReport, CopyRules, FileWriter, FsWriter, TreeCopier};
use crate::handoff::{self, PostExitScheduler, ScriptedHandoff, SelfReplacePlan};
use crate::layout::{self, LayoutKind, LayoutProfile};
use crate::process::{
    self, DetachedLauncher, ExitOutcome, Launcher, LockPolicy, ProcessControl, SystemProcesses,
    WaitPolicy,
};
use crate::progress::{ProgressSink, Prompt, UnattendedPrompt};
use crate::settings::UpdateSettings;
use crate::{PayloadSource, UpdateRequest};

const COPY_PROGRESS_START: u32 = 60;
const COPY_PROGRESS_END: u32 = 90;

// ══════════════════════════════════════════════════════
// 단계
// ══════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    AwaitTargetExit,
    ValidatePreconditions,
    StageExtract,
    Classify,
    ApplyFiles,
    SelfUpdateHandoff,
    Cleanup,
    Relaunch,
    Countdown,
    Terminal,
    Aborted,
}

/// 단계 전이 검증 + 기록
#[derive(Debug)]
pub struct PhaseTracker {
    current: Phase,
    history: Vec<Phase>,
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self {
            current: Phase::Init,
            history: vec![Phase::Init],
        }
    }
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Phase {
        self.current
    }

    pub fn history(&self) -> &[Phase] {
        &self.history
    }

    pub fn can_transition(&self, to: Phase) -> bool {
        use Phase::*;
        matches!(
            (self.current, to),
            (Init, AwaitTargetExit)
                | (Init, ValidatePreconditions)
                | (AwaitTargetExit, ValidatePreconditions)
                | (ValidatePreconditions, StageExtract)
                | (StageExtract, Classify)
                | (Classify, ApplyFiles)
                | (ApplyFiles, SelfUpdateHandoff)
                | (SelfUpdateHandoff, Cleanup)
                | (Cleanup, Relaunch)
                | (Relaunch, Countdown)
                | (Countdown, Terminal)
        ) || (to == Aborted && !matches!(self.current, Terminal | Aborted))
    }

    pub fn advance(&mut self, to: Phase) -> Result<()> {
        if !self.can_transition(to) {
            return Err(UpdateError::InvalidTransition {
                from: self.current,
                to,
            });
        }
        tracing::debug!("[Pipeline] {:?} -> {:?}", self.current, to);
        self.current = to;
        self.history.push(to);
        Ok(())
    }
}

// ══════════════════════════════════════════════════════
// 결과
// ══════════════════════════════════════════════════════

/// 성공했지만 사용자가 알아야 할 사항
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caveat {
    /// 잠금 때문에 건너뛴 파일
    LockedFilesSkipped(Vec<PathBuf>),
    /// 새 업데이터가 있었지만 교체 예약 실패, 수동 교체 필요
    SelfUpdateNotScheduled { replacement: Option<PathBuf>, reason: String },
    CleanupFailed { path: PathBuf, reason: String },
    RelaunchFailed { program: PathBuf, reason: String },
}

/// 한 번의 실행 결과
#[derive(Debug, Clone, Default)]
pub struct UpdateReport {
    pub exit: Option<ExitOutcome>,
    pub layout: Option<LayoutKind>,
    pub purged: usize,
    pub copy: CopyReport,
    pub self_update: Option<SelfReplacePlan>,
    pub relaunched: bool,
    pub caveats: Vec<Caveat>,
    pub phases: Vec<Phase>,
}

// ══════════════════════════════════════════════════════
// 스테이징
// ══════════════════════════════════════════════════════

/// 한 번의 실행이 독점하는 임시 압축 해제 디렉터리
///
/// 명시적으로 [`StagingArea::remove`]하지 않고 drop되면(실패 경로) 최선을 다해 삭제합니다.
#[derive(Debug)]
pub struct StagingArea {
    path: PathBuf,
    removed: bool,
}

impl StagingArea {
    /// 이전 실패로 남은 디렉터리를 지우고 새로 생성
    pub fn create(path: PathBuf) -> Result<Self> {
        if path.exists() {
            tracing::info!("[Pipeline] Removing leftover staging {}", path.display());
            fs::remove_dir_all(&path).map_err(|e| UpdateError::io("remove staging", &path, e))?;
        }
        fs::create_dir_all(&path).map_err(|e| UpdateError::io("create staging", &path, e))?;
        Ok(Self { path, removed: false })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn remove(mut self) -> std::io::Result<()> {
        self.removed = true;
        fs::remove_dir_all(&self.path)
    }
}

impl Drop for StagingArea {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        if let Err(e) = fs::remove_dir_all(&self.path) {
            tracing::warn!(
                "[Pipeline] Could not remove staging {} after failure: {}",
                self.path.display(),
                e
            );
        }
    }
}

// ══════════════════════════════════════════════════════
// 오케스트레이터
// ══════════════════════════════════════════════════════

/// 업데이트 파이프라인
///
/// 플랫폼 의존 기능은 모두 주입 가능하며 기본값은 실제 시스템 구현입니다.
pub struct Orchestrator<'a> {
    settings: &'a UpdateSettings,
    sink: &'a dyn ProgressSink,
    prompt: &'a dyn Prompt,
    procs: &'a dyn ProcessControl,
    scheduler: &'a dyn PostExitScheduler,
    launcher: &'a dyn Launcher,
    writer: &'a dyn FileWriter,
    self_exe: Option<PathBuf>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(settings: &'a UpdateSettings, sink: &'a dyn ProgressSink) -> Self {
        Self {
            settings,
            sink,
            prompt: &UnattendedPrompt,
            procs: &SystemProcesses,
            scheduler: &ScriptedHandoff,
            launcher: &DetachedLauncher,
            writer: &FsWriter,
            self_exe: std::env::current_exe().ok(),
        }
    }

    pub fn with_prompt(mut self, prompt: &'a dyn Prompt) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn with_processes(mut self, procs: &'a dyn ProcessControl) -> Self {
        self.procs = procs;
        self
    }

    pub fn with_scheduler(mut self, scheduler: &'a dyn PostExitScheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn with_launcher(mut self, launcher: &'a dyn Launcher) -> Self {
        self.launcher = launcher;
        self
    }

    pub fn with_writer(mut self, writer: &'a dyn FileWriter) -> Self {
        self.writer = writer;
        self
    }

    /// 복사·정리·셀프 업데이트에서 "실행 중인 업데이터"로 취급할 경로
    pub fn with_self_exe(mut self, self_exe: Option<PathBuf>) -> Self {
        self.self_exe = self_exe;
        self
    }

    /// 파이프라인 실행
    ///
    /// 실패하면 `show_error` 후 에러를 반환하고, 성공하면 `show_success` 후 종료
    /// 카운트다운까지 진행합니다.
    pub fn run(&self, request: &UpdateRequest) -> Result<UpdateReport> {
        let mut phases = PhaseTracker::new();
        let mut report = UpdateReport::default();

        match self.execute(request, &mut phases, &mut report) {
            Ok(message) => {
                self.sink.show_success(&message);
                self.countdown(&mut phases);
                report.phases = phases.history().to_vec();
                Ok(report)
            }
            Err(e) => {
                let failed_at = phases.current();
                if let Err(te) = phases.advance(Phase::Aborted) {
                    tracing::error!("[Pipeline] {}", te);
                }
                tracing::error!("[Pipeline] Update failed during {:?}: {}", failed_at, e);
                self.sink.show_error(&format!("Update failed: {}", e));
                Err(e)
            }
        }
    }

    /// Relaunch 단계까지 실행하고 성공 메시지 반환
    fn execute(
        &self,
        request: &UpdateRequest,
        phases: &mut PhaseTracker,
        report: &mut UpdateReport,
    ) -> Result<String> {
        self.status("Preparing update...");
        self.sink.set_progress(5, 100);

        if request.watched_pid.is_some() || !self.settings.kill_process_names.is_empty() {
            phases.advance(Phase::AwaitTargetExit)?;
            report.exit = self.await_target_exit(request)?;
            self.sink.set_progress(10, 100);
        }

        phases.advance(Phase::ValidatePreconditions)?;
        self.validate(request)?;
        self.sink.set_progress(15, 100);

        phases.advance(Phase::StageExtract)?;
        let (staging, staged_root) = self.stage(request)?;

        phases.advance(Phase::Classify)?;
        self.status("Detecting installation type...");
        let profile = layout::classify_installation(&request.target_dir, self.settings);
        self.detail(&format!("Installation type: {}", profile.kind));
        report.layout = Some(profile.kind);
        self.sink.set_progress(50, 100);

        phases.advance(Phase::ApplyFiles)?;
        self.apply_files(request, &staged_root, &profile, report)?;

        phases.advance(Phase::SelfUpdateHandoff)?;
        self.self_update_handoff(&staged_root, report);
        self.sink.set_progress(92, 100);

        phases.advance(Phase::Cleanup)?;
        self.cleanup(request, staging, report);
        self.sink.set_progress(95, 100);

        phases.advance(Phase::Relaunch)?;
        let message = self.relaunch(request, report);
        self.sink.set_progress(100, 100);
        Ok(message)
    }

    fn status(&self, text: &str) {
        tracing::info!("[Pipeline] {}", text);
        self.sink.set_status(text);
    }

    fn detail(&self, line: &str) {
        tracing::info!("[Pipeline] {}", line);
        self.sink.append_detail(line);
    }

    // ── AwaitTargetExit ────────────────────────────────────

    fn await_target_exit(&self, request: &UpdateRequest) -> Result<Option<ExitOutcome>> {
        let mut outcome = None;
        if let Some(pid) = request.watched_pid {
            self.status(&format!("Waiting for program (PID {}) to exit...", pid));
            let policy = WaitPolicy {
                max_wait: self.settings.wait_for_exit(),
                poll_interval: self.settings.poll_interval(),
                report_every: self.settings.wait_report_every(),
                kill_settle: self.settings.kill_settle(),
            };
            let exit = process::wait_for_exit(self.procs, pid, &policy, &mut |elapsed| {
                self.sink.set_status(&format!(
                    "Still waiting for PID {} to exit ({}s)...",
                    pid,
                    elapsed.as_secs()
                ));
            })?;
            match exit {
                ExitOutcome::NotRunning => self.detail(&format!("PID {} is not running", pid)),
                ExitOutcome::Exited => self.detail(&format!("PID {} exited", pid)),
                ExitOutcome::Killed => self.detail(&format!("PID {} did not exit in time and was killed", pid)),
            }
            outcome = Some(exit);
        }

        for name in &self.settings.kill_process_names {
            let killed = self.procs.kill_by_name(name)?;
            if killed > 0 {
                self.detail(&format!("Closed {} ({} process(es))", name, killed));
            }
        }
        Ok(outcome)
    }

    // ── ValidatePreconditions ──────────────────────────────

    fn validate(&self, request: &UpdateRequest) -> Result<()> {
        self.status("Checking update package...");
        let payload = request.payload.path();
        let payload_ok = match &request.payload {
            PayloadSource::Archive(p) => p.is_file(),
            PayloadSource::Directory(p) => p.is_dir(),
        };
        if !payload_ok {
            return Err(UpdateError::PayloadMissing(payload.to_path_buf()));
        }

        let target = &request.target_dir;
        if !target.is_dir() {
            return Err(UpdateError::TargetMissing(target.clone()));
        }
        let empty = fs::read_dir(target)
            .map_err(|e| UpdateError::io("read target", target, e))?
            .next()
            .is_none();
        if empty {
            return Err(UpdateError::TargetEmpty(target.clone()));
        }

        if matches!(request.payload, PayloadSource::Directory(_)) && fsops::is_same_file(payload, target) {
            return Err(UpdateError::Config(format!(
                "payload directory is the target directory: {}",
                target.display()
            )));
        }
        Ok(())
    }

    // ── StageExtract ───────────────────────────────────────

    fn stage(&self, request: &UpdateRequest) -> Result<(Option<StagingArea>, PathBuf)> {
        match &request.payload {
            PayloadSource::Archive(archive) => {
                self.status("Extracting update package...");
                self.sink.set_progress(20, 100);
                let staging =
                    StagingArea::create(request.target_dir.join(&self.settings.staging_dir_name))?;
                let written = fsops::extract_archive(archive, staging.path())?;
                self.detail(&format!("Extracted {} file(s)", written));
                self.sink.set_progress(25, 100);

                let root = fsops::find_single_extracted_root(staging.path())?;
                self.sink.set_progress(30, 100);
                Ok((Some(staging), root))
            }
            PayloadSource::Directory(dir) => {
                self.detail(&format!("Using extracted payload {}", dir.display()));
                let root = fsops::find_single_extracted_root(dir)?;
                self.sink.set_progress(30, 100);
                Ok((None, root))
            }
        }
    }

    // ── ApplyFiles ─────────────────────────────────────────

    fn apply_files(
        &self,
        request: &UpdateRequest,
        staged_root: &Path,
        profile: &LayoutProfile,
        report: &mut UpdateReport,
    ) -> Result<()> {
        let target = &request.target_dir;

        if profile.purge_before_copy {
            self.status("Removing old library files...");
            let mut excludes = profile.preserve_dirs.clone();
            excludes.extend(["plugin".to_string(), "plugins".to_string()]);
            excludes.push(self.settings.staging_dir_name.clone());
            excludes.extend(self.settings.purge_extra_excludes.iter().cloned());

            let mut keep = vec![request.payload.path().to_path_buf(), staged_root.to_path_buf()];
            keep.extend(self.self_exe.clone());

            report.purged =
                fsops::delete_stale_files(target, &excludes, self.settings.purge_filter(), &keep)?;
            self.detail(&format!("Removed {} old file(s)", report.purged));
        }
        self.sink.set_progress(COPY_PROGRESS_START, 100);

        self.status("Copying files...");
        let rules = CopyRules {
            preserve_dirs: &profile.preserve_dirs,
            plugin_whitelist: &profile.plugin_whitelist,
        };
        let plan = fsops::plan_copy(staged_root, target, &rules)?;
        for skipped in &plan.skipped_dirs {
            self.detail(&format!("Preserved {}", relative(skipped, target)));
        }

        let lock_policy = LockPolicy {
            prompt_timeout: self.settings.lock_prompt_timeout(),
            retry_delay: self.settings.lock_retry_delay(),
            kill_settle: self.settings.kill_settle(),
        };
        let copier = TreeCopier::new(
            self.writer,
            self.self_exe.as_deref(),
            self.settings.lock_retry_attempts,
        );
        let copy = copier.run(
            &plan,
            &mut |path| {
                self.status(&format!("File in use: {}", relative(path, target)));
                Ok(process::resolve_lock_conflict(
                    self.procs,
                    self.prompt,
                    self.sink,
                    path,
                    &lock_policy,
                ))
            },
            &mut |done, total, path| {
                self.sink.append_detail(&format!("Updated {}", relative(path, target)));
                self.sink
                    .set_progress(copy_progress(done, total), 100);
            },
        )?;

        if !copy.skipped_locked.is_empty() {
            for path in &copy.skipped_locked {
                tracing::warn!("[Pipeline] Locked file left unchanged: {}", path.display());
            }
            report
                .caveats
                .push(Caveat::LockedFilesSkipped(copy.skipped_locked.clone()));
        }
        self.detail(&format!("Copied {} file(s)", copy.copied));
        report.copy = copy;
        self.sink.set_progress(COPY_PROGRESS_END, 100);
        Ok(())
    }

    // ── SelfUpdateHandoff ──────────────────────────────────

    fn self_update_handoff(&self, staged_root: &Path, report: &mut UpdateReport) {
        let Some(self_exe) = self.self_exe.as_deref() else {
            return;
        };
        let delay = Duration::from_secs(self.settings.self_update_delay_secs);

        let plan = match handoff::prepare_self_update(
            staged_root,
            self_exe,
            &self.settings.updater_backup_suffix,
            delay,
        ) {
            Ok(Some(plan)) => plan,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!("[SelfUpdate] Could not stage new updater: {}", e);
                report.caveats.push(Caveat::SelfUpdateNotScheduled {
                    replacement: None,
                    reason: e.to_string(),
                });
                return;
            }
        };

        self.status("Updating the updater...");
        match self.scheduler.schedule(&plan) {
            Ok(()) => {
                self.detail("Updater will be replaced after exit");
                report.self_update = Some(plan);
            }
            Err(e) => {
                tracing::warn!(
                    "[SelfUpdate] Could not schedule replacement: {}. Replace {} with {} manually",
                    e,
                    plan.current.display(),
                    plan.replacement.display()
                );
                report.caveats.push(Caveat::SelfUpdateNotScheduled {
                    replacement: Some(plan.replacement),
                    reason: e.to_string(),
                });
            }
        }
    }

    // ── Cleanup ────────────────────────────────────────────

    fn cleanup(&self, request: &UpdateRequest, staging: Option<StagingArea>, report: &mut UpdateReport) {
        self.status("Cleaning up...");
        if let Some(staging) = staging {
            let path = staging.path().to_path_buf();
            if let Err(e) = staging.remove() {
                tracing::warn!("[Pipeline] Could not remove staging {}: {}", path.display(), e);
                report.caveats.push(Caveat::CleanupFailed {
                    path,
                    reason: e.to_string(),
                });
            }
        }

        let payload = request.payload.path();
        if self.settings.delete_payload_after_update && payload.starts_with(&request.target_dir) {
            let removed = match &request.payload {
                PayloadSource::Archive(p) => fs::remove_file(p),
                PayloadSource::Directory(p) => fs::remove_dir_all(p),
            };
            match removed {
                Ok(()) => self.detail(&format!("Deleted update package {}", payload.display())),
                Err(e) => {
                    tracing::warn!("[Pipeline] Could not delete update package {}: {}", payload.display(), e);
                    report.caveats.push(Caveat::CleanupFailed {
                        path: payload.to_path_buf(),
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    // ── Relaunch ───────────────────────────────────────────

    fn relaunch(&self, request: &UpdateRequest, report: &mut UpdateReport) -> String {
        let Some(program) = &request.main_program else {
            return "Update complete.".to_string();
        };

        let failure = if !program.exists() {
            "program not found".to_string()
        } else {
            self.status("Starting program...");
            match self.launcher.launch(program, &request.relaunch_args()) {
                Ok(_) => {
                    report.relaunched = true;
                    return format!("Update complete. {} has been restarted.", display_name(program));
                }
                Err(e) => e.to_string(),
            }
        };

        tracing::warn!("[Pipeline] Relaunch of {} failed: {}", program.display(), failure);
        report.caveats.push(Caveat::RelaunchFailed {
            program: program.clone(),
            reason: failure.clone(),
        });
        format!(
            "Update complete, but {} could not be started ({}). Please start it manually.",
            display_name(program),
            failure
        )
    }

    // ── Countdown → Terminal ───────────────────────────────

    fn countdown(&self, phases: &mut PhaseTracker) {
        if let Err(e) = phases.advance(Phase::Countdown) {
            tracing::error!("[Pipeline] {}", e);
            return;
        }
        for remaining in (1..=self.settings.close_countdown_secs).rev() {
            if !self.sink.is_active() {
                break;
            }
            self.sink.set_status(&format!("Closing in {} seconds...", remaining));
            std::thread::sleep(Duration::from_secs(1));
        }
        if let Err(e) = phases.advance(Phase::Terminal) {
            tracing::error!("[Pipeline] {}", e);
        }
    }
}

/// 복사 진행률을 60–90 구간에 선형 배분
fn copy_progress(done: usize, total: usize) -> u32 {
    if total == 0 {
        return COPY_PROGRESS_END;
    }
    let span = (COPY_PROGRESS_END - COPY_PROGRESS_START) as usize;
    COPY_PROGRESS_START + (span * done / total) as u32
}

fn relative(path: &Path, root: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).display().to_string()
}

fn display_name(program: &Path) -> String {
    program
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| program.display().to_string())
}
