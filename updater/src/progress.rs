//! 진행 상태/로그 싱크 — 파이프라인이 표시 계층과 통신하는 유일한 경로
//!
//! 파이프라인은 전용 워커 스레드에서 실행되고, 표시 계층(콘솔 또는 터미널 창)은
//! 자신의 스레드에서 이벤트 루프를 돌립니다. 워커에서 표시 상태를 직접 수정하지 않고
//! [`ProgressEvent`]를 채널로 전달합니다.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Duration;

/// 파이프라인이 호출하는 진행 상태 인터페이스
///
/// `show_error` / `show_success` 는 한 번의 실행에서 정확히 하나만 호출됩니다.
pub trait ProgressSink: Send + Sync {
    fn set_status(&self, text: &str);
    fn set_progress(&self, current: u32, max: u32);
    fn append_detail(&self, line: &str);
    fn show_error(&self, message: &str);
    fn show_success(&self, message: &str);

    /// 표시 계층이 아직 살아있는지 여부. 닫히면 카운트다운을 중단합니다.
    fn is_active(&self) -> bool {
        true
    }
}

/// 제한 시간이 있는 확인 질문의 응답
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptAnswer {
    Yes,
    No,
    /// 업데이트 전체 중단
    Abort,
    /// 응답 없음: 호출 측 기본값 적용
    TimedOut,
}

/// 사용자 확인 인터페이스 (잠금 충돌 처리에서 사용)
pub trait Prompt: Send + Sync {
    fn ask(&self, question: &str, timeout: Duration) -> PromptAnswer;
}

/// 무인 실행용. 질문하지 않고 즉시 기본값을 선택
#[derive(Debug, Default, Clone, Copy)]
pub struct UnattendedPrompt;

impl Prompt for UnattendedPrompt {
    fn ask(&self, question: &str, _timeout: Duration) -> PromptAnswer {
        tracing::info!("[Prompt] Unattended, using default for: {}", question.lines().next().unwrap_or(""));
        PromptAnswer::TimedOut
    }
}

/// 아무것도 표시하지 않는 싱크
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn set_status(&self, _text: &str) {}
    fn set_progress(&self, _current: u32, _max: u32) {}
    fn append_detail(&self, _line: &str) {}
    fn show_error(&self, _message: &str) {}
    fn show_success(&self, _message: &str) {}
}

/// 워커 → 표시 계층 이벤트
#[derive(Debug)]
pub enum ProgressEvent {
    Status(String),
    Progress { current: u32, max: u32 },
    Detail(String),
    Error(String),
    Success(String),
    /// 확인 질문. 응답은 `reply`로 돌려보냄
    Ask {
        question: String,
        timeout: Duration,
        reply: Sender<PromptAnswer>,
    },
}

/// 채널 기반 싱크: 이벤트를 표시 스레드로 마샬링
///
/// 수신 측이 사라지면(창 닫힘) 이후 `is_active()` 는 false 를 반환합니다.
/// 파일 작업 자체는 중단하지 않습니다.
pub struct ChannelSink {
    tx: Sender<ProgressEvent>,
    closed: AtomicBool,
}

impl ChannelSink {
    /// 싱크와 표시 계층용 수신기를 함께 생성
    pub fn channel() -> (Self, Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel();
        (
            Self {
                tx,
                closed: AtomicBool::new(false),
            },
            rx,
        )
    }

    fn send(&self, event: ProgressEvent) {
        if self.closed.load(Ordering::Relaxed) {
            return;
        }
        if self.tx.send(event).is_err() {
            tracing::debug!("[Progress] Display surface closed, dropping further UI updates");
            self.closed.store(true, Ordering::Relaxed);
        }
    }
}

impl ProgressSink for ChannelSink {
    fn set_status(&self, text: &str) {
        self.send(ProgressEvent::Status(text.to_string()));
    }

    fn set_progress(&self, current: u32, max: u32) {
        self.send(ProgressEvent::Progress { current, max });
    }

    fn append_detail(&self, line: &str) {
        self.send(ProgressEvent::Detail(line.to_string()));
    }

    fn show_error(&self, message: &str) {
        self.send(ProgressEvent::Error(message.to_string()));
    }

    fn show_success(&self, message: &str) {
        self.send(ProgressEvent::Success(message.to_string()));
    }

    fn is_active(&self) -> bool {
        !self.closed.load(Ordering::Relaxed)
    }
}

impl Prompt for ChannelSink {
    fn ask(&self, question: &str, timeout: Duration) -> PromptAnswer {
        let (reply, answer) = mpsc::channel();
        self.send(ProgressEvent::Ask {
            question: question.to_string(),
            timeout,
            reply,
        });
        if !self.is_active() {
            return PromptAnswer::TimedOut;
        }
        answer.recv_timeout(timeout).unwrap_or(PromptAnswer::TimedOut)
    }
}
