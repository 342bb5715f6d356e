use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionState {
    Idle,
    Preparing,
    PreparingAssets,
    SavingAssets,
    AwaitingExecutionContext,
    Executing,
    Complete,
    Error,
}

impl ExecutionState {
    /// 是否有錄製正在進行（`Idle` 與 `Error` 以外的狀態）
    #[must_use]
    pub const fn is_active(&self) -> bool {
        !matches!(self, Self::Idle | Self::Error)
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Preparing => "Preparing",
            Self::PreparingAssets => "PreparingAssets",
            Self::SavingAssets => "SavingAssets",
            Self::AwaitingExecutionContext => "AwaitingExecutionContext",
            Self::Executing => "Executing",
            Self::Complete => "Complete",
            Self::Error => "Error",
        }
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一次錄製的結束方式；使用者中斷不算錯誤
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    UserInterruption,
    Failed,
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "完成"),
            Self::UserInterruption => write!(f, "使用者中斷"),
            Self::Failed => write!(f, "失敗"),
        }
    }
}
