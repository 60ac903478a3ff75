//! 진행 창 상태 — 파이프라인 이벤트를 받아 화면에 그릴 값으로 유지

use std::collections::VecDeque;
use std::sync::mpsc::Sender;
use std::time::{Duration, Instant};

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use hs_updater_lib::{ProgressEvent, PromptAnswer};

const MAX_DETAIL_LINES: usize = 500;

/// 실패 후 창을 유지하는 최대 시간 (키를 누르면 즉시 닫힘)
pub const FAILURE_LINGER: Duration = Duration::from_secs(30);

/// 잠금 충돌 확인 대화상자
pub struct Modal {
    pub question: String,
    pub deadline: Instant,
    reply: Sender<PromptAnswer>,
}

impl Modal {
    pub fn remaining(&self, now: Instant) -> Duration {
        self.deadline.saturating_duration_since(now)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Running,
    Failed(String),
    Succeeded(String),
}

pub struct WindowState {
    pub title: String,
    pub status: String,
    pub percent: u16,
    pub details: VecDeque<String>,
    pub outcome: Outcome,
    pub modal: Option<Modal>,
    pub quit: bool,
    /// 파이프라인이 끝나 이벤트 채널이 닫힌 시각
    pub finished_at: Option<Instant>,
}

impl WindowState {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            status: "Starting...".into(),
            percent: 0,
            details: VecDeque::new(),
            outcome: Outcome::Running,
            modal: None,
            quit: false,
            finished_at: None,
        }
    }

    pub fn pipeline_finished(&mut self, now: Instant) {
        self.finished_at.get_or_insert(now);
        self.modal = None;
    }

    /// 성공이면 바로 닫고, 실패면 키 입력 또는 `linger` 경과까지 오류 배너 유지
    pub fn should_close(&self, now: Instant, linger: Duration) -> bool {
        if self.quit {
            return true;
        }
        match self.finished_at {
            None => false,
            Some(at) => !matches!(self.outcome, Outcome::Failed(_)) || now >= at + linger,
        }
    }

    pub fn awaiting_dismissal(&self) -> bool {
        self.finished_at.is_some() && matches!(self.outcome, Outcome::Failed(_))
    }

    pub fn apply(&mut self, event: ProgressEvent) {
        match event {
            ProgressEvent::Status(text) => self.status = text,
            ProgressEvent::Progress { current, max } => {
                self.percent = if max == 0 {
                    100
                } else {
                    (current.min(max) as u64 * 100 / max as u64) as u16
                };
            }
            ProgressEvent::Detail(line) => self.push_detail(line),
            ProgressEvent::Error(message) => {
                self.push_detail(format!("✗ {}", message));
                self.outcome = Outcome::Failed(message);
            }
            ProgressEvent::Success(message) => {
                self.push_detail(format!("✓ {}", message));
                self.outcome = Outcome::Succeeded(message);
            }
            ProgressEvent::Ask {
                question,
                timeout,
                reply,
            } => {
                // 이전 질문이 남아 있으면 기본값으로 닫음
                self.answer(PromptAnswer::TimedOut);
                self.modal = Some(Modal {
                    question,
                    deadline: Instant::now() + timeout,
                    reply,
                });
            }
        }
    }

    fn push_detail(&mut self, line: String) {
        if self.details.len() == MAX_DETAIL_LINES {
            self.details.pop_front();
        }
        self.details.push_back(line);
    }

    fn answer(&mut self, answer: PromptAnswer) {
        if let Some(modal) = self.modal.take() {
            // 워커가 이미 시간 초과로 넘어갔으면 수신자가 없음
            let _ = modal.reply.send(answer);
        }
    }

    /// 시간이 지난 대화상자 닫기 (워커 쪽은 이미 기본값으로 진행)
    pub fn expire_modal(&mut self, now: Instant) {
        if self.modal.as_ref().map(|m| now >= m.deadline).unwrap_or(false) {
            self.modal = None;
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.answer(PromptAnswer::TimedOut);
            self.quit = true;
            return;
        }

        if self.finished_at.is_some() {
            self.quit = true;
            return;
        }

        if self.modal.is_some() {
            match key.code {
                KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => self.answer(PromptAnswer::Yes),
                KeyCode::Char('n') | KeyCode::Char('N') => self.answer(PromptAnswer::No),
                KeyCode::Char('a') | KeyCode::Char('A') => self.answer(PromptAnswer::Abort),
                KeyCode::Esc => self.answer(PromptAnswer::TimedOut),
                _ => {}
            }
            return;
        }

        if matches!(key.code, KeyCode::Char('q') | KeyCode::Esc) {
            self.quit = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ask(state: &mut WindowState, timeout: Duration) -> mpsc::Receiver<PromptAnswer> {
        let (reply, rx) = mpsc::channel();
        state.apply(ProgressEvent::Ask {
            question: "lib/a.jar is locked".into(),
            timeout,
            reply,
        });
        rx
    }

    #[test]
    fn progress_is_scaled_to_percent() {
        let mut state = WindowState::new("test");
        state.apply(ProgressEvent::Progress { current: 30, max: 60 });
        assert_eq!(state.percent, 50);
        state.apply(ProgressEvent::Progress { current: 1, max: 0 });
        assert_eq!(state.percent, 100);
    }

    #[test]
    fn success_and_error_set_banner() {
        let mut state = WindowState::new("test");
        state.apply(ProgressEvent::Success("Update complete.".into()));
        assert_eq!(state.outcome, Outcome::Succeeded("Update complete.".into()));
        assert_eq!(state.details.back().map(String::as_str), Some("✓ Update complete."));
    }

    #[test]
    fn modal_keys_answer_the_worker() {
        let mut state = WindowState::new("test");
        let rx = ask(&mut state, Duration::from_secs(60));
        state.handle_key(key(KeyCode::Char('q')));
        assert!(!state.quit, "q must not close the window while asking");
        state.handle_key(key(KeyCode::Char('n')));
        assert!(state.modal.is_none());
        assert_eq!(rx.recv().unwrap(), PromptAnswer::No);

        let rx = ask(&mut state, Duration::from_secs(60));
        state.handle_key(key(KeyCode::Char('a')));
        assert_eq!(rx.recv().unwrap(), PromptAnswer::Abort);
    }

    #[test]
    fn expired_modal_is_dismissed() {
        let mut state = WindowState::new("test");
        let _rx = ask(&mut state, Duration::ZERO);
        state.expire_modal(Instant::now());
        assert!(state.modal.is_none());
    }

    #[test]
    fn escape_closes_window_without_modal() {
        let mut state = WindowState::new("test");
        state.handle_key(key(KeyCode::Esc));
        assert!(state.quit);
    }

    #[test]
    fn failure_banner_stays_until_key_or_timeout() {
        let mut state = WindowState::new("test");
        state.apply(ProgressEvent::Error("Update failed: payload not found".into()));
        let now = Instant::now();
        state.pipeline_finished(now);

        assert!(state.awaiting_dismissal());
        assert!(!state.should_close(now, FAILURE_LINGER));
        assert!(state.should_close(now + FAILURE_LINGER, FAILURE_LINGER));

        state.handle_key(key(KeyCode::Char('x')));
        assert!(state.should_close(now, FAILURE_LINGER));
    }

    #[test]
    fn success_closes_as_soon_as_pipeline_ends() {
        let mut state = WindowState::new("test");
        state.apply(ProgressEvent::Success("Update complete.".into()));
        let now = Instant::now();
        assert!(!state.should_close(now, FAILURE_LINGER));
        state.pipeline_finished(now);
        assert!(state.should_close(now, FAILURE_LINGER));
    }

    #[test]
    fn detail_log_is_bounded() {
        let mut state = WindowState::new("test");
        for i in 0..(MAX_DETAIL_LINES + 10) {
            state.apply(ProgressEvent::Detail(format!("line {}", i)));
        }
        assert_eq!(state.details.len(), MAX_DETAIL_LINES);
        assert_eq!(state.details.front().map(String::as_str), Some("line 10"));
    }
}
