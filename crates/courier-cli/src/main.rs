//! # courier
//!
//! Dispatcher・worker・status polling を 1 プロセスで動かすデモ CLI。
//! broker と store は in-memory 実装を使う。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use courier_core::app::AppBuilder;
use courier_core::config::CourierConfig;
use courier_core::domain::HandlerError;
use courier_core::impls::{InMemoryBrokerQueue, InMemoryResultStore};
use courier_core::observability::init_tracing;
use courier_core::typed::{Handler, Task};

#[derive(Parser, Debug)]
#[command(name = "courier")]
#[command(about = "Submit tasks, run workers and poll results in one process")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Configuration file (TOML, JSON or YAML); COURIER_* variables override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Submit one `add` task and print its final record
    Demo {
        #[arg(long, default_value_t = 5)]
        x: i64,
        #[arg(long, default_value_t = 7)]
        y: i64,
        /// Number of workers (default: worker.concurrency)
        #[arg(long)]
        workers: Option<usize>,
        /// Give up waiting for the result after this many seconds
        #[arg(long, default_value_t = 10)]
        timeout_secs: u64,
    },
    /// Print the effective configuration
    CheckConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct AddTask {
    x: i64,
    y: i64,
}

impl Task for AddTask {
    const TYPE: &'static str = "add";
    type Output = i64;
}

struct AddHandler;

#[async_trait]
impl Handler<AddTask> for AddHandler {
    async fn handle(&self, task: AddTask) -> Result<i64, HandlerError> {
        task.x
            .checked_add(task.y)
            .ok_or_else(|| HandlerError::new("Overflow", format!("{} + {} overflows", task.x, task.y)))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = CourierConfig::load(cli.config.as_deref()).context("loading configuration")?;
    init_tracing(&config.logging);

    match cli.command {
        Commands::Demo {
            x,
            y,
            workers,
            timeout_secs,
        } => demo(config, AddTask { x, y }, workers, Duration::from_secs(timeout_secs)).await,
        Commands::CheckConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

async fn demo(
    config: CourierConfig,
    task: AddTask,
    workers: Option<usize>,
    timeout: Duration,
) -> anyhow::Result<()> {
    let workers = workers.unwrap_or(config.worker.concurrency);

    // (A) broker / store と App を用意
    let queue = Arc::new(InMemoryBrokerQueue::new(config.visibility_timeout()));
    let store = Arc::new(InMemoryResultStore::default());
    let app = AppBuilder::new()
        .register::<AddTask, _>(AddHandler)?
        .expect_tasks(&[AddTask::TYPE])
        .config(config)
        .build(queue.clone(), store)?;

    // (B) worker と GC を起動
    let group = app.spawn_workers(workers);
    let (gc_stop, gc_rx) = watch::channel(false);
    let gc = app.gc_loop();
    let gc_join = tokio::spawn(async move { gc.run(gc_rx).await });

    // (C) 投入
    let handle = app.dispatcher().submit_typed(&task).await?;
    tracing::info!(%handle, "submitted");

    // (D) 完了をポーリングで待つ（Ctrl-C で中断）
    let status = app.status();
    let outcome = tokio::select! {
        waited = status.wait(handle, Duration::from_millis(50), timeout) => {
            waited.with_context(|| format!("waiting for {handle}"))
        }
        _ = tokio::signal::ctrl_c() => Err(anyhow::anyhow!("interrupted while waiting for {handle}")),
    };

    // (E) graceful shutdown
    group.shutdown_and_join().await;
    let _ = gc_stop.send(true);
    gc_join.await.context("gc loop")?;

    let record = outcome?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    tracing::info!(stats = ?queue.stats().await, "queue drained");
    Ok(())
}
