//! 固定大小的 worker 池 - 编排层
//!
//! ## 工作方式
//!
//! 1. **排队**：批次开始时收集所有 pending / error 行，按顺序排成队列
//! 2. **领取**：每个 worker 先检查取消标志，再用原子游标领取下一行
//! 3. **调用**：worker 调用转换函数（通常是 LLM 改写），不设重试
//! 4. **写回**：worker 只发送 [`RowUpdate`]，由持有 [`BatchState`] 的一方按下标更新
//!
//! 取消是协作式的：已发出的调用会跑完并写回结果，只是不再领取新行。

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::error::RewriteError;
use crate::models::row::{CaptionRow, RowStatus};
use crate::services::llm_service::RewriteOutput;
use crate::workflow::{BatchState, RowCtx, RowUpdate};

/// 单行转换函数
pub trait RowTransform: Send + Sync + 'static {
    fn transform(&self, row: CaptionRow) -> BoxFuture<'static, Result<RewriteOutput, RewriteError>>;
}

impl<F, Fut> RowTransform for F
where
    F: Fn(CaptionRow) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<RewriteOutput, RewriteError>> + Send + 'static,
{
    fn transform(&self, row: CaptionRow) -> BoxFuture<'static, Result<RewriteOutput, RewriteError>> {
        Box::pin(self(row))
    }
}

/// 取消标志
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// 批次运行报告
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// 进入队列的行数
    pub queued: usize,
    /// 实际发出调用的行数
    pub dispatched: usize,
    pub completed: usize,
    pub failed: usize,
    /// 因取消而未领取的行数
    pub not_dispatched: usize,
    pub cancelled: bool,
}

/// 用固定数量的 worker 处理所有 pending / error 行
///
/// 返回时没有任何行停留在 processing 状态
pub async fn run_batch<T: RowTransform>(
    state: &mut BatchState,
    transform: Arc<T>,
    concurrency: usize,
    cancel: &CancelFlag,
) -> BatchReport {
    let queue: Arc<Vec<(usize, CaptionRow)>> = Arc::new(
        state
            .pending_indices()
            .into_iter()
            .map(|index| (index, state.rows()[index].clone()))
            .collect(),
    );

    let mut report = BatchReport {
        queued: queue.len(),
        ..Default::default()
    };
    if queue.is_empty() {
        return report;
    }

    let worker_count = concurrency.max(1).min(queue.len());
    info!(
        "🚀 开始处理 {} 行，worker 数量: {}",
        queue.len(),
        worker_count
    );

    let cursor = Arc::new(AtomicUsize::new(0));
    let (tx, mut rx) = mpsc::unbounded_channel::<RowUpdate>();
    let total_rows = state.len();

    let mut handles = Vec::with_capacity(worker_count);
    for worker in 1..=worker_count {
        let worker_loop = WorkerLoop {
            worker,
            total_rows,
            queue: Arc::clone(&queue),
            cursor: Arc::clone(&cursor),
            transform: Arc::clone(&transform),
            tx: tx.clone(),
            cancel: cancel.clone(),
        };
        handles.push((worker, tokio::spawn(worker_loop.run())));
    }
    drop(tx);

    // 唯一的写入方：按下标应用更新
    while let Some(update) = rx.recv().await {
        match state.apply(&update) {
            Ok(_) => match &update {
                RowUpdate::Started { .. } => report.dispatched += 1,
                RowUpdate::Completed { .. } => {
                    report.completed += 1;
                    log_progress(&report);
                }
                RowUpdate::Failed { .. } => {
                    report.failed += 1;
                    log_progress(&report);
                }
            },
            Err(e) => error!("状态更新被拒绝: {}", e),
        }
    }

    for (worker, handle) in handles {
        if let Err(e) = handle.await {
            error!("[worker#{}] 任务异常退出: {}", worker, e);
        }
    }

    // worker 异常退出时，它领取的行仍是 processing
    for (index, _) in queue.iter() {
        if state.rows()[*index].status == RowStatus::Processing {
            let update = RowUpdate::Failed {
                index: *index,
                error: "处理任务异常退出".to_string(),
            };
            if state.apply(&update).is_ok() {
                report.failed += 1;
            }
        }
    }

    report.not_dispatched = report.queued - report.dispatched;
    report.cancelled = cancel.is_cancelled();
    if report.cancelled {
        warn!(
            "⏹️ 批次已停止: {} 行未处理",
            report.not_dispatched
        );
    }
    report
}

struct WorkerLoop<T: RowTransform> {
    worker: usize,
    total_rows: usize,
    queue: Arc<Vec<(usize, CaptionRow)>>,
    cursor: Arc<AtomicUsize>,
    transform: Arc<T>,
    tx: mpsc::UnboundedSender<RowUpdate>,
    cancel: CancelFlag,
}

impl<T: RowTransform> WorkerLoop<T> {
    async fn run(self) {
        loop {
            if self.cancel.is_cancelled() {
                debug!("[worker#{}] 收到停止信号", self.worker);
                break;
            }

            let slot = self.cursor.fetch_add(1, Ordering::SeqCst);
            let Some((index, row)) = self.queue.get(slot) else {
                break;
            };
            let index = *index;
            let ctx = RowCtx::new(index, &row.id, self.total_rows, self.worker);

            // 接收方只在所有 worker 退出后才会关闭
            let _ = self.tx.send(RowUpdate::Started { index });
            debug!("{} ⏳ 开始处理", ctx);

            let update = match self.transform.transform(row.clone()).await {
                Ok(output) => {
                    debug!("{} ✓ 改写完成", ctx);
                    RowUpdate::Completed { index, output }
                }
                Err(e) => {
                    warn!("{} ❌ 改写失败: {}", ctx, e);
                    RowUpdate::Failed {
                        index,
                        error: e.to_string(),
                    }
                }
            };
            let _ = self.tx.send(update);
        }
    }
}

fn log_progress(report: &BatchReport) {
    info!(
        "📈 进度: {}/{} (成功 {}, 失败 {})",
        report.completed + report.failed,
        report.queued,
        report.completed,
        report.failed
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::Barrier;

    fn rows(n: usize) -> BatchState {
        BatchState::new(
            (0..n)
                .map(|i| CaptionRow::new(i.to_string(), format!("caption {}", i)))
                .collect(),
        )
    }

    fn ok(text: String) -> Result<RewriteOutput, RewriteError> {
        Ok(RewriteOutput {
            rewritten: text,
            extracted_original: None,
        })
    }

    #[tokio::test]
    async fn test_each_pending_row_transformed_exactly_once() {
        let mut state = rows(10);
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        let transform = move |row: CaptionRow| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                ok(row.original.to_uppercase())
            }
        };

        let report = run_batch(&mut state, Arc::new(transform), 3, &CancelFlag::new()).await;

        assert_eq!(calls.load(Ordering::SeqCst), 10);
        assert_eq!(report.dispatched, 10);
        assert_eq!(report.completed, 10);
        assert!(!report.cancelled);
        assert!(state
            .rows()
            .iter()
            .all(|r| r.status == RowStatus::Completed));
        assert_eq!(state.rows()[4].rewritten.as_deref(), Some("CAPTION 4"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_in_flight_never_exceeds_concurrency() {
        let mut state = rows(12);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let (current, max) = (Arc::clone(&in_flight), Arc::clone(&peak));
        let transform = move |row: CaptionRow| {
            let (current, max) = (Arc::clone(&current), Arc::clone(&max));
            async move {
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                max.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                current.fetch_sub(1, Ordering::SeqCst);
                ok(row.original)
            }
        };

        run_batch(&mut state, Arc::new(transform), 3, &CancelFlag::new()).await;
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(state.rows().iter().all(|r| r.status != RowStatus::Processing));
    }

    #[tokio::test]
    async fn test_failures_are_isolated_and_rerun_only_failed() {
        let mut state = rows(6);
        let fail_odd = |row: CaptionRow| async move {
            let n: usize = row.id.parse().unwrap_or(0);
            if n % 2 == 1 {
                Err(RewriteError::api_failed("mock", "503 Service Unavailable"))
            } else {
                ok(format!("ok {}", n))
            }
        };

        let report = run_batch(&mut state, Arc::new(fail_odd), 3, &CancelFlag::new()).await;
        assert_eq!((report.completed, report.failed), (3, 3));
        assert_eq!(state.pending_indices(), vec![1, 3, 5]);
        assert!(state.rows()[1]
            .error
            .as_deref()
            .unwrap()
            .contains("503"));

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let always_ok = move |row: CaptionRow| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move { ok(row.original) }
        };
        let report = run_batch(&mut state, Arc::new(always_ok), 3, &CancelFlag::new()).await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(report.queued, 3);
        assert!(state.pending_indices().is_empty());
        assert!(state.rows().iter().all(|r| r.error.is_none()));
    }

    #[tokio::test]
    async fn test_stop_lets_in_flight_finish_and_leaves_rest_pending() {
        let mut state = rows(10);
        let cancel = CancelFlag::new();
        let barrier = Arc::new(Barrier::new(3));
        let calls = Arc::new(AtomicUsize::new(0));

        let (flag, gate, counter) = (cancel.clone(), Arc::clone(&barrier), Arc::clone(&calls));
        let transform = move |row: CaptionRow| {
            let (flag, gate, counter) = (flag.clone(), Arc::clone(&gate), Arc::clone(&counter));
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                // 三个 worker 都领取到行之后再发出停止
                gate.wait().await;
                flag.cancel();
                tokio::time::sleep(Duration::from_millis(5)).await;
                ok(row.original)
            }
        };

        let report = run_batch(&mut state, Arc::new(transform), 3, &cancel).await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(report.cancelled);
        assert_eq!(report.dispatched, 3);
        assert_eq!(report.completed, 3);
        assert_eq!(report.not_dispatched, 7);

        let statuses: Vec<RowStatus> = state.rows().iter().map(|r| r.status).collect();
        assert_eq!(&statuses[..3], &[RowStatus::Completed; 3]);
        assert!(statuses[3..].iter().all(|s| *s == RowStatus::Pending));
    }

    #[tokio::test]
    async fn test_cancel_before_start_dispatches_nothing() {
        let mut state = rows(4);
        let cancel = CancelFlag::new();
        cancel.cancel();

        let never = |_row: CaptionRow| async move { ok("unreachable".to_string()) };
        let report = run_batch(&mut state, Arc::new(never), 3, &cancel).await;

        assert_eq!(report.dispatched, 0);
        assert_eq!(report.not_dispatched, 4);
        assert_eq!(state.pending_indices().len(), 4);
    }

    #[tokio::test]
    async fn test_panicking_worker_does_not_leave_processing_rows() {
        let mut state = rows(3);
        let transform = |row: CaptionRow| async move {
            if row.id == "1" {
                panic!("mock transform panic");
            }
            ok(row.original)
        };

        let report = run_batch(&mut state, Arc::new(transform), 3, &CancelFlag::new()).await;

        assert!(state.rows().iter().all(|r| r.status != RowStatus::Processing));
        assert_eq!(state.rows()[1].status, RowStatus::Error);
        assert_eq!(report.completed + report.failed, 3);
    }

    #[tokio::test]
    async fn test_empty_queue() {
        let mut state = BatchState::default();
        let never = |_row: CaptionRow| async move { ok(String::new()) };
        let report = run_batch(&mut state, Arc::new(never), 3, &CancelFlag::new()).await;
        assert_eq!(report, BatchReport::default());
    }
}
