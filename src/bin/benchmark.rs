//! Resume Agent 基准评测
//!
//! 从 benchmark_test_cases 加载启用的用例，逐条执行并写入 benchmark_results，最后打印汇总指标。
//!
//! 启动: cargo run --bin resume-bench -- [category]
//! 只看历史: cargo run --bin resume-bench -- --summary [category]

use std::sync::Arc;

use anyhow::Context;
use resume_agent::benchmark::{BenchmarkMetrics, BenchmarkRunner};
use resume_agent::broadcast::NoopBroadcaster;
use resume_agent::config::load_config;
use resume_agent::core::ChatService;
use resume_agent::create_agent_components;
use resume_agent::observability;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let summary_only = args.first().is_some_and(|a| a == "--summary");
    if summary_only {
        args.remove(0);
    }
    let category = args.into_iter().next();
    let cfg = load_config(None).context("Failed to load config")?;
    let components = create_agent_components(cfg, Arc::new(NoopBroadcaster))
        .context("Failed to create agent")?;
    let runner = BenchmarkRunner::new(ChatService::new(Arc::new(components)));

    if summary_only {
        for r in runner.recent_results(20).await.context("Failed to load results")? {
            let status = if r.passed { "PASS" } else { "FAIL" };
            println!(
                "[{status}] #{} test {} [{}] {} ({}ms)",
                r.result_id, r.test_id, r.category, r.execution_timestamp, r.execution_time_ms
            );
        }
        let m = runner
            .summary(category.as_deref())
            .await
            .context("Failed to load summary")?;
        print_metrics(&m);
        return Ok(());
    }

    let report = runner
        .run_suite(category.as_deref())
        .await
        .context("Benchmark suite failed")?;

    for r in &report.results {
        let status = if r.passed { "PASS" } else { "FAIL" };
        println!("[{status}] test {} ({}ms)", r.test_id, r.execution_time_ms);
        if let Some(err) = &r.error {
            println!("       {err}");
        }
    }

    print_metrics(&report.metrics);
    Ok(())
}

fn print_metrics(m: &BenchmarkMetrics) {
    println!("{}", "=".repeat(60));
    println!("Total Tests:    {}", m.total_tests);
    println!("Passed:         {}", m.passed_tests);
    println!("Failed:         {}", m.failed_tests);
    println!("Success Rate:   {}%", m.success_rate);
    println!("Avg Time:       {}ms", m.avg_execution_time_ms);
    for (category, c) in &m.by_category {
        println!("  {category}: {}/{} ({}%)", c.passed, c.total, c.success_rate);
    }
    println!("{}", "=".repeat(60));
}
