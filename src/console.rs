//! 콘솔 표시 계층 — 진행 상태를 표준 출력에, 질문은 표준 입력으로

use std::io::{BufRead, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Mutex;
use std::time::Duration;

use hs_updater_lib::{ProgressSink, Prompt, PromptAnswer};

/// 줄 단위 콘솔 출력 싱크
///
/// 진행률은 10% 단위로만 출력합니다.
#[derive(Default)]
pub struct ConsoleSink {
    last_bucket: Mutex<Option<u32>>,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressSink for ConsoleSink {
    fn set_status(&self, text: &str) {
        println!("⏳ {}", text);
    }

    fn set_progress(&self, current: u32, max: u32) {
        let percent = if max == 0 { 100 } else { current.min(max) * 100 / max };
        let bucket = percent / 10;
        let mut last = self.last_bucket.lock().unwrap_or_else(|e| e.into_inner());
        if *last != Some(bucket) {
            *last = Some(bucket);
            println!("  [{:<10}] {:>3}%", "#".repeat(bucket as usize), percent);
        }
    }

    fn append_detail(&self, line: &str) {
        println!("  {}", line);
    }

    fn show_error(&self, message: &str) {
        eprintln!("✗ {}", message);
    }

    fn show_success(&self, message: &str) {
        println!("✓ {}", message);
    }
}

/// 표준 입력 질문 응답기
///
/// 입력은 보조 스레드 하나가 줄 단위로 읽어 채널로 넘기므로 시간 제한을 걸 수 있습니다.
#[derive(Default)]
pub struct ConsolePrompt {
    lines: Mutex<Option<Receiver<String>>>,
}

impl ConsolePrompt {
    pub fn new() -> Self {
        Self::default()
    }

    fn spawn_reader() -> Receiver<String> {
        let (tx, rx) = mpsc::channel();
        let spawned = std::thread::Builder::new()
            .name("stdin-reader".into())
            .spawn(move || {
                let stdin = std::io::stdin();
                for line in stdin.lock().lines() {
                    let Ok(line) = line else { break };
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            });
        if let Err(e) = spawned {
            tracing::warn!("[Console] Could not start input reader: {}", e);
        }
        rx
    }
}

impl Prompt for ConsolePrompt {
    fn ask(&self, question: &str, timeout: Duration) -> PromptAnswer {
        let mut guard = self.lines.lock().unwrap_or_else(|e| e.into_inner());
        let lines = guard.get_or_insert_with(Self::spawn_reader);

        // 질문 전에 입력된 줄은 버림
        while lines.try_recv().is_ok() {}

        println!();
        println!("? {}", question);
        print!("  [Y]es / [n]o / [a]bort ({}s): ", timeout.as_secs());
        let _ = std::io::stdout().flush();

        match lines.recv_timeout(timeout) {
            Ok(line) => parse_answer(&line),
            Err(RecvTimeoutError::Timeout) => {
                println!();
                tracing::info!("[Console] No answer within {:?}", timeout);
                PromptAnswer::TimedOut
            }
            Err(RecvTimeoutError::Disconnected) => PromptAnswer::TimedOut,
        }
    }
}

/// 빈 입력은 기본값(예)
pub fn parse_answer(input: &str) -> PromptAnswer {
    match input.trim().to_ascii_lowercase().as_str() {
        "" | "y" | "yes" => PromptAnswer::Yes,
        "n" | "no" => PromptAnswer::No,
        "a" | "abort" => PromptAnswer::Abort,
        _ => PromptAnswer::TimedOut,
    }
}
