use super::collaborators::{ExecutionHost, MaterializedArtifact, ScheduleMaterializer};
use super::state::{ExecutionState, RunOutcome};
use crate::component::progress_channel::{
    ProgressChannel, ProgressRecord, RunDescriptor, TakeMetadata, TaskTake,
};
use crate::component::schedule_builder::{
    ChannelFactory, MasterSchedule, Resolution, ScheduleParams, Sequence, TaskTable,
    TrackChannelFactory, WildcardContext, build_schedule,
};
use crate::error::RecorderError;
use crate::tools::remove_run_artifacts;
use anyhow::Result;
use chrono::{Local, NaiveDateTime};
use log::{error, info, warn};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use uuid::Uuid;

pub const DEFAULT_HANDOFF_TIMEOUT: Duration = Duration::from_secs(30);

const CHANNEL_DIR_NAME: &str = "channel";
const RUNS_DIR_NAME: &str = "runs";

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub schedule: ScheduleParams,
    pub resolution: Resolution,
    pub user_tokens: BTreeMap<String, String>,
    /// 暫存資料夾：進度通道與每次錄製的排程檔案都放在這裡
    pub work_dir: PathBuf,
    pub handoff_timeout: Duration,
    /// 保留暫存檔案以便除錯
    pub retain_temp_artifacts: bool,
}

impl ControllerOptions {
    #[must_use]
    pub fn channel_dir(&self) -> PathBuf {
        self.work_dir.join(CHANNEL_DIR_NAME)
    }

    #[must_use]
    pub fn runs_dir(&self) -> PathBuf {
        self.work_dir.join(RUNS_DIR_NAME)
    }
}

/// 一次錄製的建構期資料
struct ActiveRun {
    run_id: Uuid,
    started_at: NaiveDateTime,
    sequences: Vec<Sequence>,
    tasks: TaskTable,
    run_dir: PathBuf,
    schedule: Option<MasterSchedule>,
    artifact: Option<MaterializedArtifact>,
    handoff_started: Option<Instant>,
}

/// 錄製流程的狀態機
///
/// 由呼叫端以固定間隔呼叫 `tick`，每次只前進一步，不會阻塞。
/// 執行期間只透過進度通道得知執行環境的狀況。
pub struct ExecutionController {
    options: ControllerOptions,
    channel: ProgressChannel,
    factory: Box<dyn ChannelFactory>,
    materializer: Box<dyn ScheduleMaterializer>,
    host: Box<dyn ExecutionHost>,
    state: ExecutionState,
    status: String,
    outcome: Option<RunOutcome>,
    last_error: Option<RecorderError>,
    progress: ProgressRecord,
    warnings: Vec<String>,
    run: Option<ActiveRun>,
    updated_tasks: Option<TaskTable>,
}

impl ExecutionController {
    pub fn new(
        options: ControllerOptions,
        materializer: Box<dyn ScheduleMaterializer>,
        host: Box<dyn ExecutionHost>,
    ) -> Result<Self> {
        let channel = ProgressChannel::open(&options.channel_dir())?;
        Ok(Self {
            options,
            channel,
            factory: Box::new(TrackChannelFactory),
            materializer,
            host,
            state: ExecutionState::Idle,
            status: String::new(),
            outcome: None,
            last_error: None,
            progress: ProgressRecord::default(),
            warnings: Vec::new(),
            run: None,
            updated_tasks: None,
        })
    }

    #[must_use]
    pub fn with_channel_factory(mut self, factory: Box<dyn ChannelFactory>) -> Self {
        self.factory = factory;
        self
    }

    #[must_use]
    pub const fn state(&self) -> ExecutionState {
        self.state
    }

    #[must_use]
    pub fn status(&self) -> &str {
        &self.status
    }

    #[must_use]
    pub const fn outcome(&self) -> Option<RunOutcome> {
        self.outcome
    }

    #[must_use]
    pub const fn last_error(&self) -> Option<&RecorderError> {
        self.last_error.as_ref()
    }

    #[must_use]
    pub const fn progress(&self) -> &ProgressRecord {
        &self.progress
    }

    /// 最近一次建構排程時的警告
    #[must_use]
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    #[must_use]
    pub fn schedule(&self) -> Option<&MasterSchedule> {
        self.run.as_ref().and_then(|r| r.schedule.as_ref())
    }

    #[must_use]
    pub const fn channel(&self) -> &ProgressChannel {
        &self.channel
    }

    #[must_use]
    pub const fn options(&self) -> &ControllerOptions {
        &self.options
    }

    /// 取出完成後已遞增 take 編號的任務表（只能取一次）
    pub fn take_updated_tasks(&mut self) -> Option<TaskTable> {
        self.updated_tasks.take()
    }

    /// 開始一次錄製
    ///
    /// 只能從 `Idle` 開始；至少要有一個選取的序列帶有啟用的任務，
    /// 否則維持 `Idle` 並回傳 false。
    pub fn start(&mut self, sequences: Vec<Sequence>, tasks: TaskTable) -> bool {
        match self.state {
            ExecutionState::Idle => {}
            ExecutionState::Error => {
                self.status = "請先重設錯誤狀態再開始錄製".to_string();
                warn!("{}", self.status);
                return false;
            }
            state => {
                self.status = format!("已有錄製正在進行 ({state})");
                warn!("{}", self.status);
                return false;
            }
        }

        let has_enabled_task = sequences.iter().any(|s| {
            tasks
                .get(&s.id)
                .is_some_and(|list| list.iter().any(|t| t.enabled))
        });
        if sequences.is_empty() || !has_enabled_task {
            self.status = "沒有可錄製的項目".to_string();
            info!("{}", self.status);
            return false;
        }

        let run_id = Uuid::new_v4();
        info!("開始錄製 {run_id}：{} 個序列", sequences.len());

        self.outcome = None;
        self.last_error = None;
        self.progress = ProgressRecord::default();
        self.warnings.clear();
        self.updated_tasks = None;
        self.run = Some(ActiveRun {
            run_id,
            started_at: Local::now().naive_local(),
            sequences,
            tasks,
            run_dir: self.options.runs_dir().join(run_id.to_string()),
            schedule: None,
            artifact: None,
            handoff_started: None,
        });
        self.transition(ExecutionState::Preparing, "準備錄製");
        true
    }

    /// 推進狀態機一步，回傳推進後的狀態
    pub fn tick(&mut self) -> ExecutionState {
        match self.state {
            ExecutionState::Idle | ExecutionState::Error => {}
            ExecutionState::Preparing => {
                self.transition(ExecutionState::PreparingAssets, "建立主排程");
            }
            ExecutionState::PreparingAssets => self.prepare_assets(),
            ExecutionState::SavingAssets => self.save_assets(),
            ExecutionState::AwaitingExecutionContext => self.await_execution_context(),
            ExecutionState::Executing => self.poll_execution(),
            ExecutionState::Complete => self.finish_run(),
        }
        self.state
    }

    /// 停止錄製並回到 `Idle`，重複呼叫不會出錯
    ///
    /// 先要求執行環境自行停止，再拆除；已錄到的輸出會保留。
    /// 已經錄製完成的批次照常收尾，take 編號仍會遞增。
    pub fn stop(&mut self) {
        if self.state == ExecutionState::Complete {
            self.finish_run();
            return;
        }

        let was_running = self.state.is_active();

        self.teardown_execution();
        self.run = None;

        if was_running {
            self.outcome = Some(RunOutcome::UserInterruption);
            info!("錄製已由使用者停止");
        }
        self.transition(ExecutionState::Idle, "已停止");
    }

    /// 從任何狀態強制回到 `Idle`，並清除錯誤
    pub fn reset(&mut self) {
        self.teardown_execution();
        self.run = None;
        self.last_error = None;
        self.outcome = None;
        self.progress = ProgressRecord::default();
        self.transition(ExecutionState::Idle, "已重設");
    }

    fn transition(&mut self, next: ExecutionState, status: &str) {
        if self.state != next {
            info!("狀態 {} → {next}: {status}", self.state);
        }
        self.state = next;
        self.status = status.to_string();
    }

    fn fail(&mut self, error: RecorderError) {
        error!("錄製失敗: {error}");
        self.teardown_execution();
        self.run = None;
        self.status = error.to_string();
        self.outcome = Some(RunOutcome::Failed);
        self.last_error = Some(error);
        if self.state != ExecutionState::Error {
            info!("狀態 {} → {}", self.state, ExecutionState::Error);
        }
        self.state = ExecutionState::Error;
    }

    /// 使用者中斷：不是錯誤，保留已錄到的輸出
    fn interrupted(&mut self, status: &str) {
        warn!("{status}");
        self.teardown_execution();
        self.run = None;
        self.outcome = Some(RunOutcome::UserInterruption);
        self.transition(ExecutionState::Idle, status);
    }

    fn teardown_execution(&mut self) {
        if self.channel.is_alive() {
            if let Err(e) = self.channel.request_halt() {
                warn!("無法送出停止要求: {e:#}");
            }
        }
        self.host.teardown();
        if let Err(e) = self.channel.clear() {
            warn!("無法清除進度通道: {e:#}");
        }
    }

    fn prepare_assets(&mut self) {
        let Some(run) = self.run.as_mut() else {
            self.fail(RecorderError::Construction("沒有進行中的錄製".to_string()));
            return;
        };

        let wildcards = WildcardContext::new(
            run.started_at,
            self.options.resolution,
            &self.options.user_tokens,
        );
        let schedule = match build_schedule(
            &run.sequences,
            &run.tasks,
            &self.options.schedule,
            &wildcards,
            self.factory.as_mut(),
        ) {
            Ok(schedule) => schedule,
            Err(e) => {
                self.fail(e);
                return;
            }
        };

        self.warnings.clone_from(&schedule.warnings);

        let artifact = match self.materializer.materialize(&schedule, &run.run_dir) {
            Ok(artifact) => artifact,
            Err(e) => {
                self.fail(RecorderError::Materialization(format!("{e:#}")));
                return;
            }
        };

        info!("排程檔案已寫出: {}", artifact.path.display());
        run.schedule = Some(schedule);
        run.artifact = Some(artifact);
        self.transition(ExecutionState::SavingAssets, "驗證排程檔案");
    }

    fn save_assets(&mut self) {
        let Some(run) = self.run.as_mut() else {
            self.fail(RecorderError::Construction("沒有進行中的錄製".to_string()));
            return;
        };
        let (Some(schedule), Some(artifact)) = (run.schedule.as_ref(), run.artifact.as_ref())
        else {
            self.fail(RecorderError::Materialization("排程檔案尚未寫出".to_string()));
            return;
        };

        if let Err(e) = self.materializer.load_and_verify(artifact) {
            self.fail(RecorderError::Materialization(format!("{e:#}")));
            return;
        }

        let descriptor = RunDescriptor {
            run_id: run.run_id,
            artifact_path: artifact.path.clone(),
            artifact_digest: artifact.digest.clone(),
            total_duration: schedule.total_duration,
            frame_rate: schedule.frame_rate,
            warmup_duration: schedule.warmup_duration,
            resolution: self.options.resolution,
            takes: take_metadata(schedule, &run.tasks),
            created_at: run.started_at.format("%Y-%m-%dT%H:%M:%S").to_string(),
        };

        let handoff = self
            .channel
            .clear()
            .and_then(|()| self.channel.write_run_descriptor(&descriptor))
            .and_then(|()| self.channel.set_alive())
            .and_then(|()| self.host.launch(self.channel.dir()));

        if let Err(e) = handoff {
            self.fail(RecorderError::ExecutionHandoff(format!("{e:#}")));
            return;
        }

        run.handoff_started = Some(Instant::now());
        self.transition(ExecutionState::AwaitingExecutionContext, "等待執行環境接手");
    }

    fn await_execution_context(&mut self) {
        let Some(run) = self.run.as_ref() else {
            self.fail(RecorderError::ExecutionHandoff("沒有進行中的錄製".to_string()));
            return;
        };
        let run_id = run.run_id;
        let waited = run.handoff_started.map_or(Duration::ZERO, |t| t.elapsed());

        if let Some(fault) = self.read_fault() {
            self.fail(RecorderError::ExecutionFault(fault));
            return;
        }

        if self.attached_to(run_id) {
            self.transition(ExecutionState::Executing, "錄製中");
            return;
        }

        if !self.host.is_running() {
            // 接手後立即跑完的執行環境也算接手成功
            if self.attached_to(run_id) {
                self.transition(ExecutionState::Executing, "錄製中");
            } else {
                self.fail(RecorderError::ExecutionHandoff(
                    "執行環境在接手前就已結束".to_string(),
                ));
            }
        } else if waited >= self.options.handoff_timeout {
            self.fail(RecorderError::ExecutionHandoff(format!(
                "等待 {:.1}s 仍未接手",
                waited.as_secs_f64()
            )));
        }
    }

    fn attached_to(&self, run_id: Uuid) -> bool {
        match self.channel.read_attached() {
            Ok(Some(info)) if info.run_id == run_id => {
                info!("執行環境已接手 [{}]", info.pid);
                true
            }
            Ok(Some(info)) => {
                warn!("忽略其他錄製的接手紀錄: {}", info.run_id);
                false
            }
            Ok(None) => false,
            Err(e) => {
                warn!("無法讀取接手紀錄: {e:#}");
                false
            }
        }
    }

    fn poll_execution(&mut self) {
        // 執行環境先寫結果再清除存活旗標，所以要先取樣存活與程序狀態，再讀結果
        let alive = self.channel.is_alive();
        let host_running = self.host.is_running();

        if self.refresh_progress() {
            self.transition(ExecutionState::Complete, "錄製完成");
            return;
        }

        if let Some(fault) = self.read_fault() {
            self.fail(RecorderError::ExecutionFault(fault));
            return;
        }

        if !alive {
            self.interrupted("執行環境在完成前停止，視為使用者中斷");
        } else if !host_running {
            self.fail(RecorderError::ExecutionFault(
                "執行環境意外結束".to_string(),
            ));
        }
    }

    /// 讀取最新進度，回傳是否已完成
    fn refresh_progress(&mut self) -> bool {
        match self.channel.read_progress() {
            Ok(Some(progress)) => {
                self.status.clone_from(&progress.status_text);
                self.progress = progress;
                self.progress.is_complete
            }
            Ok(None) => false,
            Err(e) => {
                warn!("無法讀取進度: {e:#}");
                false
            }
        }
    }

    fn read_fault(&self) -> Option<String> {
        match self.channel.read_fault() {
            Ok(fault) => fault,
            Err(e) => Some(format!("無法讀取錯誤回報: {e:#}")),
        }
    }

    fn finish_run(&mut self) {
        let Some(run) = self.run.take() else {
            self.transition(ExecutionState::Idle, "錄製完成");
            return;
        };

        let mut tasks = run.tasks;
        if let Some(schedule) = run.schedule.as_ref() {
            increment_takes(&mut tasks, schedule);
        }
        self.updated_tasks = Some(tasks);

        self.host.teardown();
        if let Err(e) = self.channel.clear() {
            warn!("無法清除進度通道: {e:#}");
        }

        if self.options.retain_temp_artifacts {
            info!("保留暫存檔案: {}", run.run_dir.display());
        } else {
            match remove_run_artifacts(&run.run_dir) {
                Ok(removed) => info!("已清除 {removed} 個暫存檔案"),
                Err(e) => warn!("無法清除暫存檔案: {e:#}"),
            }
        }

        self.outcome = Some(RunOutcome::Completed);
        info!("錄製 {} 完成", run.run_id);
        self.transition(ExecutionState::Idle, "錄製完成");
    }
}

/// 已錄製序列的每個啟用任務 take 編號加一
fn increment_takes(tasks: &mut TaskTable, schedule: &MasterSchedule) {
    for segment in &schedule.segments {
        if let Some(list) = tasks.get_mut(&segment.sequence_id) {
            for task in list.iter_mut().filter(|t| t.enabled) {
                task.take += 1;
            }
        }
    }
}

fn take_metadata(schedule: &MasterSchedule, tasks: &TaskTable) -> Vec<TakeMetadata> {
    schedule
        .segments
        .iter()
        .map(|segment| TakeMetadata {
            sequence_id: segment.sequence_id.clone(),
            sequence_name: segment.sequence_name.clone(),
            takes: tasks
                .get(&segment.sequence_id)
                .map(|list| {
                    list.iter()
                        .filter(|t| t.enabled)
                        .map(|t| TaskTake {
                            kind: t.kind(),
                            target: t.target.clone(),
                            take: t.take,
                        })
                        .collect()
                })
                .unwrap_or_default(),
        })
        .collect()
}
