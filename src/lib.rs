//! hs-updater 실행 파일 구성 요소
//!
//! 업데이트 파이프라인 자체는 `hs-updater-lib`에 있고, 여기에는 명령줄 인자,
//! 설정 파일 로딩, 콘솔/터미널 창 표시 계층만 있습니다.

pub mod cli;
pub mod commands;
pub mod config;
pub mod console;
pub mod tui;
