//! 테스트용 가짜 구현 — 프로세스 테이블, 질문 응답, 싱크, 셀프 업데이트 예약

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{Result, UpdateError};
use crate::handoff::{PostExitScheduler, SelfReplacePlan};
use crate::process::{ProcessControl, ProcessInfo};
use crate::progress::{ProgressSink, Prompt, PromptAnswer};

/// 메모리 프로세스 테이블
///
/// `with_process(pid, name, Some(n))`: `is_alive` 조회 n번 뒤 스스로 종료.
/// `None`이면 kill 전까지 계속 실행.
#[derive(Default)]
pub struct FakeProcesses {
    table: Mutex<HashMap<u32, (String, Option<u32>)>>,
    killed: Mutex<Vec<u32>>,
    killed_names: Mutex<Vec<String>>,
    kill_fails: bool,
    exits_during_kill: bool,
}

impl FakeProcesses {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_process(self, pid: u32, name: &str, lives_for: Option<u32>) -> Self {
        self.table
            .lock()
            .unwrap()
            .insert(pid, (name.to_string(), lives_for));
        self
    }

    pub fn failing_kills(mut self) -> Self {
        self.kill_fails = true;
        self
    }

    /// kill 직전에 스스로 종료: 프로세스는 사라지지만 kill 은 "not found" 로 실패
    pub fn exits_during_kill(mut self) -> Self {
        self.exits_during_kill = true;
        self
    }

    pub fn killed(&self) -> Vec<u32> {
        self.killed.lock().unwrap().clone()
    }

    pub fn killed_names(&self) -> Vec<String> {
        self.killed_names.lock().unwrap().clone()
    }
}

impl ProcessControl for FakeProcesses {
    fn is_alive(&self, pid: u32) -> bool {
        let mut table = self.table.lock().unwrap();
        let lives_for = match table.get(&pid) {
            None => return false,
            Some((_, lives_for)) => *lives_for,
        };
        match lives_for {
            Some(0) => {
                table.remove(&pid);
                false
            }
            Some(n) => {
                if let Some(entry) = table.get_mut(&pid) {
                    entry.1 = Some(n - 1);
                }
                true
            }
            None => true,
        }
    }

    fn kill(&self, pid: u32) -> Result<()> {
        if self.exits_during_kill {
            self.table.lock().unwrap().remove(&pid);
            return Err(UpdateError::ProcessKill {
                pid,
                reason: "process not found".into(),
            });
        }
        if self.kill_fails {
            return Err(UpdateError::ProcessKill {
                pid,
                reason: "access denied".into(),
            });
        }
        self.table.lock().unwrap().remove(&pid);
        self.killed.lock().unwrap().push(pid);
        Ok(())
    }

    fn kill_by_name(&self, name: &str) -> Result<usize> {
        let mut table = self.table.lock().unwrap();
        let pids: Vec<u32> = table
            .iter()
            .filter(|(_, (n, _))| n.eq_ignore_ascii_case(name))
            .map(|(pid, _)| *pid)
            .collect();
        for pid in &pids {
            table.remove(pid);
        }
        self.killed_names.lock().unwrap().push(name.to_string());
        Ok(pids.len())
    }

    fn find_holders_of(&self, path: &Path) -> Vec<ProcessInfo> {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let mut holders: Vec<ProcessInfo> = self
            .table
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, (name, _))| !stem.is_empty() && name.to_lowercase().contains(&stem))
            .map(|(pid, (name, _))| ProcessInfo {
                pid: *pid,
                name: name.clone(),
            })
            .collect();
        holders.sort_by_key(|p| p.pid);
        holders
    }
}

/// 미리 정한 순서대로 답하는 질문 응답기. 답이 떨어지면 시간 초과
pub struct ScriptedPrompt {
    answers: Mutex<VecDeque<PromptAnswer>>,
    questions: Mutex<Vec<String>>,
}

impl ScriptedPrompt {
    pub fn new(answers: Vec<PromptAnswer>) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
            questions: Mutex::new(Vec::new()),
        }
    }

    pub fn questions(&self) -> Vec<String> {
        self.questions.lock().unwrap().clone()
    }
}

impl Prompt for ScriptedPrompt {
    fn ask(&self, question: &str, _timeout: Duration) -> PromptAnswer {
        self.questions.lock().unwrap().push(question.to_string());
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(PromptAnswer::TimedOut)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkCall {
    Status(String),
    Progress(u32, u32),
    Detail(String),
    Error(String),
    Success(String),
}

/// 호출 기록 싱크
pub struct RecordingSink {
    calls: Mutex<Vec<SinkCall>>,
    active: AtomicBool,
}

impl Default for RecordingSink {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            active: AtomicBool::new(true),
        }
    }
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn closed() -> Self {
        let sink = Self::default();
        sink.active.store(false, Ordering::Relaxed);
        sink
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                SinkCall::Error(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    pub fn successes(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                SinkCall::Success(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    pub fn progress(&self) -> Vec<u32> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                SinkCall::Progress(cur, _) => Some(cur),
                _ => None,
            })
            .collect()
    }

    pub fn details(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                SinkCall::Detail(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    fn push(&self, call: SinkCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl ProgressSink for RecordingSink {
    fn set_status(&self, text: &str) {
        self.push(SinkCall::Status(text.to_string()));
    }
    fn set_progress(&self, current: u32, max: u32) {
        self.push(SinkCall::Progress(current, max));
    }
    fn append_detail(&self, line: &str) {
        self.push(SinkCall::Detail(line.to_string()));
    }
    fn show_error(&self, message: &str) {
        self.push(SinkCall::Error(message.to_string()));
    }
    fn show_success(&self, message: &str) {
        self.push(SinkCall::Success(message.to_string()));
    }
    fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }
}

/// 예약 요청만 기록하는 셀프 업데이트 스케줄러
#[derive(Default)]
pub struct RecordingScheduler {
    plans: Mutex<Vec<SelfReplacePlan>>,
    fail: bool,
}

impl RecordingScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn plans(&self) -> Vec<SelfReplacePlan> {
        self.plans.lock().unwrap().clone()
    }
}

impl PostExitScheduler for RecordingScheduler {
    fn schedule(&self, plan: &SelfReplacePlan) -> Result<()> {
        if self.fail {
            return Err(UpdateError::io(
                "schedule self-update",
                &plan.current,
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, "spawn blocked"),
            ));
        }
        self.plans.lock().unwrap().push(plan.clone());
        Ok(())
    }
}

/// 실행 요청만 기록하는 런처
#[derive(Default)]
pub struct RecordingLauncher {
    launched: Mutex<Vec<(std::path::PathBuf, Vec<String>)>>,
    fail: bool,
}

impl RecordingLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn launched(&self) -> Vec<(std::path::PathBuf, Vec<String>)> {
        self.launched.lock().unwrap().clone()
    }
}

impl crate::process::Launcher for RecordingLauncher {
    fn launch(&self, program: &Path, args: &[String]) -> std::io::Result<u32> {
        if self.fail {
            return Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "blocked"));
        }
        self.launched
            .lock()
            .unwrap()
            .push((program.to_path_buf(), args.to_vec()));
        Ok(4242)
    }
}
