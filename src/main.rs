//! Resume Agent 命令行对话
//!
//! 入口：初始化日志、加载配置、装配组件，逐行读取用户输入并交给 ChatService。
//! 命令：/clear 清空会话，/reindex 为可检索表补算嵌入，/a2a 查看抓取请求记录，/quit 退出。
//!
//! 启动: cargo run -- [session_id]

use std::sync::Arc;

use anyhow::Context;
use resume_agent::broadcast::ChannelBroadcaster;
use resume_agent::config::load_config;
use resume_agent::core::ChatService;
use resume_agent::memory::{SessionPersistence, SessionState};
use resume_agent::observability;
use resume_agent::react::ReactEvent;
use resume_agent::create_agent_components;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let cfg = load_config(None).context("Failed to load config")?;
    let session_id = std::env::args().nth(1).unwrap_or_else(|| "cli".to_string());

    let broadcaster = Arc::new(ChannelBroadcaster::new(64));
    let mut broadcasts = broadcaster.subscribe();
    tokio::spawn(async move {
        while let Ok(msg) = broadcasts.recv().await {
            tracing::info!(room = %msg.room, role = %msg.role, chars = msg.text.len(), "broadcast");
        }
    });

    let persistence = SessionPersistence::new(&cfg.app.session_dir);
    let max_turns = cfg.app.max_history_turns;
    let components =
        Arc::new(create_agent_components(cfg, broadcaster).context("Failed to create agent")?);

    // 工具调用过程打印到 stderr
    let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(ev) = event_rx.recv().await {
            match ev {
                ReactEvent::ToolCall { tool, args } => eprintln!("  -> {tool} {args}"),
                ReactEvent::AnswerRejected { correction } => eprintln!("  !! {correction}"),
                _ => {}
            }
        }
    });
    let service = ChatService::new(components.clone()).with_event_tx(event_tx);

    let mut session = persistence
        .load(&session_id)
        .context("Failed to load session")?
        .unwrap_or_else(|| SessionState::new(max_turns).with_id(session_id.clone()));
    session.history.set_max_turns(max_turns);

    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("resume-agent ready (session {}). Commands: /clear /reindex /a2a /quit", session.id);

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await.context("Failed to read stdin")? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line {
            "/quit" | "/exit" => break,
            "/clear" => {
                session.reset();
                println!("Session cleared.");
            }
            "/reindex" => {
                match components.store.backfill_all(components.embedder.as_ref()).await {
                    Ok(n) => println!("Indexed {n} row(s)."),
                    Err(e) => {
                        tracing::warn!(error = %e, "reindex failed");
                        println!("Reindex failed: {e}");
                    }
                }
            }
            "/a2a" => {
                let stats = components.a2a.stats();
                println!(
                    "A2A: {} message(s), {} pending",
                    stats.total_messages, stats.pending_requests
                );
                for msg in components.a2a.history(10) {
                    println!("  {} {} -> {} {}", msg.timestamp, msg.sender, msg.recipient, msg.action);
                }
            }
            message => {
                let resp = service.handle_message(&mut session, message, None).await;
                println!("{}", resp.response);
            }
        }

        if let Err(e) = persistence.save(&session) {
            tracing::warn!(error = %e, "failed to save session");
        }
    }

    persistence.save(&session).context("Failed to save session")?;
    Ok(())
}
