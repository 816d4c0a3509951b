//! AdPilot 命令行
//!
//! 入口：初始化日志、创建会话管理器，逐行读取用户输入并打印进度事件与最终回复。
//! `/clear` 清空历史，`/quit` 退出；请求执行中按 Ctrl-C 取消当前请求。

use std::io::Write;
use std::path::PathBuf;

use adpilot::agent::create_session_manager;
use adpilot::core::SessionManager;
use adpilot::observability;
use adpilot::pipeline::PipelineEvent;
use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};

const SESSION_ID: &str = "cli";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let manager = create_session_manager(config_path);

    println!("AdPilot ready. Ask about your campaigns; /clear resets history, /quit exits.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush().context("Failed to flush stdout")?;

        let Some(line) = lines.next_line().await.context("Failed to read input")? else {
            break;
        };
        let input = line.trim();
        match input {
            "" => continue,
            "/quit" | "/exit" => break,
            "/clear" => {
                manager.clear(SESSION_ID).await;
                println!("History cleared.");
            }
            _ => run_request(&manager, input).await,
        }
    }

    Ok(())
}

async fn run_request(manager: &SessionManager, input: &str) {
    let mut rx = manager.submit(SESSION_ID, input).await;
    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(PipelineEvent::Progress(p)) => {
                    println!("  [{}] {}: {}", p.agent, p.title, first_line(&p.content));
                }
                Some(PipelineEvent::Completed { response }) => println!("\n{}\n", response),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                manager.cancel(SESSION_ID).await;
            }
        }
    }
}

fn first_line(content: &str) -> &str {
    content.lines().next().unwrap_or_default()
}
