//! WorkerLoop - Broker Queue を drain してタスクを実行するループ
//!
//! # 1 delivery の流れ（process）
//! 1. ResultStore から record を読む（無い = TTL 切れ → ack して捨てる）
//! 2. terminal なら実行せずに ack（再配送の重複を吸収）
//! 3. PENDING -> RUNNING（RUNNING のままの再配送はそのまま再実行）
//! 4. TaskRegistry で handler を解決し、別 task で実行（panic を隔離）
//! 5. SUCCESS / FAILURE を書いてから ack
//!
//! 5 の前に record を読み直し、別の delivery が先に terminal にしていたら書かずに ack する。
//! store への書き込みに失敗したら ack しない。visibility timeout 後に再配送され、
//! run は broker エラーと同じく backoff してから次の envelope を取る。

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::Instrument;

use super::backoff::Backoff;
use crate::domain::{ErrorKind, TaskError, TaskRecord};
use crate::ports::{BrokerQueue, Clock, Delivery, ResultStore};
use crate::typed::TaskRegistry;

/// What `process` did with one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Handler ran and SUCCESS was recorded.
    Succeeded,
    /// FAILURE was recorded (handler error, panic, unknown type, bad payload).
    Failed,
    /// Record was already terminal; acked without running the handler.
    SkippedTerminal,
    /// Record expired or never existed; acked and dropped.
    Missing,
    /// Record could not be read or written; left unacked for redelivery.
    Deferred,
}

/// Per-worker tuning.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Upper bound on one dequeue call, so shutdown is noticed.
    pub dequeue_wait: Duration,
    /// Delay policy after broker or store errors.
    pub backoff: Backoff,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            dequeue_wait: Duration::from_secs(1),
            backoff: Backoff::default(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Stage {
    Arrival,
    AfterRun,
}

pub struct WorkerLoop {
    id: usize,
    registry: Arc<TaskRegistry>,
    queue: Arc<dyn BrokerQueue>,
    store: Arc<dyn ResultStore>,
    clock: Arc<dyn Clock>,
    settings: WorkerSettings,
}

impl WorkerLoop {
    pub fn new(
        id: usize,
        registry: Arc<TaskRegistry>,
        queue: Arc<dyn BrokerQueue>,
        store: Arc<dyn ResultStore>,
        clock: Arc<dyn Clock>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            id,
            registry,
            queue,
            store,
            clock,
            settings,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Run until `shutdown` turns true (or its sender is dropped).
    ///
    /// A handler already executing is allowed to finish.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(worker_id = self.id, "worker started");
        let mut failures: u32 = 0;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let dequeued = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                dequeued = self.queue.dequeue(self.settings.dequeue_wait) => dequeued,
            };

            match dequeued {
                Ok(Some(delivery)) => match self.process(delivery).await {
                    ProcessOutcome::Deferred => {
                        failures = failures.saturating_add(1);
                        tracing::warn!(worker_id = self.id, failures, "delivery deferred, backing off");
                        self.back_off(failures, &mut shutdown).await;
                    }
                    _ => failures = 0,
                },
                Ok(None) => failures = 0,
                Err(e) => {
                    failures = failures.saturating_add(1);
                    tracing::warn!(worker_id = self.id, error = %e, failures, "dequeue failed, backing off");
                    self.back_off(failures, &mut shutdown).await;
                }
            }
        }

        tracing::info!(worker_id = self.id, "worker stopped");
    }

    // shutdown が来たら待たずに戻る
    async fn back_off(&self, failures: u32, shutdown: &mut watch::Receiver<bool>) {
        let delay = self.settings.backoff.delay(failures);
        tracing::debug!(worker_id = self.id, delay_ms = delay.as_millis() as u64, "sleeping");
        tokio::select! {
            _ = shutdown.changed() => {}
            _ = tokio::time::sleep(delay) => {}
        }
    }

    /// Handle one delivery end to end.
    pub async fn process(&self, delivery: Delivery) -> ProcessOutcome {
        let span = tracing::info_span!(
            "process",
            worker_id = self.id,
            handle = %delivery.envelope.handle(),
            task_type = %delivery.envelope.task_type(),
            delivery_count = delivery.envelope.delivery_count(),
        );
        self.process_inner(delivery).instrument(span).await
    }

    async fn process_inner(&self, delivery: Delivery) -> ProcessOutcome {
        let mut record = match self.load_unfinished(&delivery, Stage::Arrival).await {
            Ok(record) => record,
            Err(outcome) => return outcome,
        };

        if record.mark_running(self.clock.now()) {
            if let Err(e) = self.save(&record).await {
                tracing::error!(error = %e, "cannot mark record running, leaving envelope for redelivery");
                return ProcessOutcome::Deferred;
            }
            tracing::debug!("task running");
        } else {
            tracing::info!("record already running, executing again after redelivery");
        }

        let outcome = self.execute(&delivery).await;

        // 実行中に別の delivery が結果を書いたかもしれないので読み直す
        let mut record = match self.load_unfinished(&delivery, Stage::AfterRun).await {
            Ok(record) => record,
            Err(outcome) => return outcome,
        };
        let now = self.clock.now();
        let (transition, result) = match outcome {
            Ok(value) => (record.mark_succeeded(value, now), ProcessOutcome::Succeeded),
            Err(error) => {
                tracing::warn!(kind = %error.kind, message = %error.message, "task failed");
                (record.mark_failed(error, now), ProcessOutcome::Failed)
            }
        };
        if let Err(e) = transition {
            tracing::error!(error = %e, state = %record.state, "illegal state transition");
            return ProcessOutcome::Deferred;
        }

        if let Err(e) = self.save(&record).await {
            tracing::error!(error = %e, "cannot store outcome, leaving envelope for redelivery");
            return ProcessOutcome::Deferred;
        }
        tracing::info!(state = %record.state, "task finished");

        self.ack(&delivery).await;
        result
    }

    /// Read the current record and decide whether this delivery may still write to it.
    ///
    /// `Err` carries the final outcome: the record is terminal or gone (acked),
    /// or unreadable (left for redelivery).
    async fn load_unfinished(&self, delivery: &Delivery, stage: Stage) -> Result<TaskRecord, ProcessOutcome> {
        match self.store.get(delivery.envelope.handle()).await {
            Ok(Some(record)) if record.is_terminal() => {
                match stage {
                    Stage::Arrival => {
                        tracing::info!(state = %record.state, "record already terminal, skipping execution")
                    }
                    Stage::AfterRun => {
                        tracing::info!(state = %record.state, "record finished by another delivery, skipping write")
                    }
                }
                self.ack(delivery).await;
                Err(ProcessOutcome::SkippedTerminal)
            }
            Ok(Some(record)) => Ok(record),
            Ok(None) => {
                tracing::warn!(?stage, "record missing or expired, dropping envelope");
                self.ack(delivery).await;
                Err(ProcessOutcome::Missing)
            }
            Err(e) => {
                tracing::error!(?stage, error = %e, "cannot read record, leaving envelope for redelivery");
                Err(ProcessOutcome::Deferred)
            }
        }
    }

    // handler は別 task で走らせ、panic を JoinError として受け取る
    async fn execute(&self, delivery: &Delivery) -> Result<serde_json::Value, TaskError> {
        let task_type = delivery.envelope.task_type();
        let handler = self.registry.resolve(task_type).ok_or_else(|| {
            TaskError::new(
                ErrorKind::UnknownTaskType,
                format!("no handler registered for '{task_type}'"),
            )
        })?;

        let payload = delivery.envelope.payload().clone();
        match tokio::spawn(async move { handler.handle_dyn(payload).await }).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(e.into()),
            Err(join) if join.is_panic() => Err(TaskError::new(
                ErrorKind::HandlerPanic,
                panic_message(join.into_panic()),
            )),
            Err(join) => Err(TaskError::new(ErrorKind::HandlerPanic, join.to_string())),
        }
    }

    // TTL は作成時に決まっているので残り時間で書き直す
    async fn save(&self, record: &TaskRecord) -> Result<(), crate::domain::StoreError> {
        let ttl = record.remaining_ttl(self.clock.now());
        self.store.put(record.handle, record, ttl).await
    }

    async fn ack(&self, delivery: &Delivery) {
        if let Err(e) = self.queue.ack(delivery.id).await {
            // 再配送されても terminal なら skip される
            tracing::warn!(delivery = %delivery.id, error = %e, "ack failed");
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}
