//! 拧紧轴采样与完成判定。
//!
//! 完成判定按以下顺序取第一个成立的条件：
//!
//! 1. 控制字从 100 变为 0（上一次采样 → 本次采样）
//! 2. 控制字为 0 且状态码 ≥ 10（错过了跳变，但终态已出现）
//! 3. 控制字为 0 且完成扭矩 > 0.01（无可用状态码，但已有完成扭矩）

use serde::{Deserialize, Serialize};

/// 控制字：启动。
pub const COMMAND_START: u16 = 100;
/// 控制字：空闲/停止。
pub const COMMAND_IDLE: u16 = 0;
/// 终态状态码下限。
pub const TERMINAL_STATUS_MIN: u16 = 10;
/// 完成扭矩判定阈值（Nm）。
pub const COMPLETED_TORQUE_EPSILON: f64 = 0.01;

/// 拧紧状态（由运行状态码映射）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TighteningStatus {
    Idle,
    Running,
    Qualified,
    TorqueTooLow,
    TorqueTooHigh,
    TimeoutError,
    AngleTooLow,
    AngleTooHigh,
    Error,
}

impl TighteningStatus {
    /// 运行状态码映射。
    ///
    /// 0 空闲；1-9 运行中；10 合格；21-25 各类不合格；其余 ≥ 10 视为错误。
    pub fn from_code(code: u16) -> Self {
        match code {
            0 => Self::Idle,
            1..=9 => Self::Running,
            10 => Self::Qualified,
            21 => Self::TorqueTooLow,
            22 => Self::TorqueTooHigh,
            23 => Self::TimeoutError,
            24 => Self::AngleTooLow,
            25 => Self::AngleTooHigh,
            _ => Self::Error,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Running => "Running",
            Self::Qualified => "Qualified",
            Self::TorqueTooLow => "TorqueTooLow",
            Self::TorqueTooHigh => "TorqueTooHigh",
            Self::TimeoutError => "TimeoutError",
            Self::AngleTooLow => "AngleTooLow",
            Self::AngleTooHigh => "AngleTooHigh",
            Self::Error => "Error",
        }
    }

    /// 不合格原因（合格、空闲、运行中返回 None）。
    pub fn failure_reason(&self) -> Option<&'static str> {
        match self {
            Self::Idle | Self::Running | Self::Qualified => None,
            Self::TorqueTooLow => Some("torque below lower limit"),
            Self::TorqueTooHigh => Some("torque above upper limit"),
            Self::TimeoutError => Some("tightening timed out on the axis"),
            Self::AngleTooLow => Some("angle below lower limit"),
            Self::AngleTooHigh => Some("angle above upper limit"),
            Self::Error => Some("axis reported an error"),
        }
    }
}

/// 完成判定命中的条件。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionSignal {
    /// 控制字 100 → 0
    CommandTransition,
    /// 控制字为 0 且终态状态码
    TerminalStatus,
    /// 控制字为 0 且有完成扭矩
    CompletedTorque,
}

/// 完成判定（纯函数，优先级固定）。
pub fn detect_completion(
    previous_command: Option<u16>,
    command: u16,
    status_code: u16,
    completed_torque: f64,
) -> Option<CompletionSignal> {
    if previous_command == Some(COMMAND_START) && command == COMMAND_IDLE {
        return Some(CompletionSignal::CommandTransition);
    }
    if command == COMMAND_IDLE && status_code >= TERMINAL_STATUS_MIN {
        return Some(CompletionSignal::TerminalStatus);
    }
    if command == COMMAND_IDLE && completed_torque > COMPLETED_TORQUE_EPSILON {
        return Some(CompletionSignal::CompletedTorque);
    }
    None
}

/// 单次轮询得到的拧紧轴采样。
///
/// `previous_command` 由采样所属的控制器实例填入（上一拍的控制字），
/// 派生属性都基于本结构计算，不额外存储。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TighteningAxisSample {
    pub ts_ms: i64,
    pub control_command: u16,
    pub previous_command: Option<u16>,
    pub running_status_code: u16,
    pub status: TighteningStatus,
    pub error_code: u16,
    pub completed_torque: f64,
    pub realtime_torque: f64,
    pub target_torque: f64,
    pub lower_limit_torque: f64,
    pub upper_limit_torque: f64,
    pub realtime_angle: f64,
    pub qualified_count: u16,
}

impl TighteningAxisSample {
    pub fn completion_signal(&self) -> Option<CompletionSignal> {
        detect_completion(
            self.previous_command,
            self.control_command,
            self.running_status_code,
            self.completed_torque,
        )
    }

    pub fn is_operation_completed(&self) -> bool {
        self.completion_signal().is_some()
    }

    pub fn has_error(&self) -> bool {
        self.error_code != 0 || self.status == TighteningStatus::Error
    }

    pub fn is_running(&self) -> bool {
        if self.is_operation_completed() {
            return false;
        }
        self.status == TighteningStatus::Running || self.control_command == COMMAND_START
    }

    /// 合格判定：仅在完成后才评估。
    pub fn is_qualified(&self) -> bool {
        self.is_operation_completed() && self.status == TighteningStatus::Qualified
    }

    pub fn is_torque_in_range(&self) -> bool {
        self.completed_torque >= self.lower_limit_torque
            && self.completed_torque <= self.upper_limit_torque
    }

    /// 扭矩达成率（百分比），目标扭矩无效时为 0。
    pub fn torque_achievement_rate(&self) -> f64 {
        if self.target_torque <= 0.0 {
            return 0.0;
        }
        self.completed_torque / self.target_torque * 100.0
    }

    /// 质量结论：未完成为 `InProgress`，完成后为合格或不合格的状态名。
    pub fn quality_result(&self) -> &'static str {
        if !self.is_operation_completed() {
            return "InProgress";
        }
        if self.is_qualified() {
            return TighteningStatus::Qualified.label();
        }
        match self.status {
            // 完成但状态码未给出终态（条件 3 命中）
            TighteningStatus::Idle | TighteningStatus::Running => TighteningStatus::Error.label(),
            other => other.label(),
        }
    }

    /// 不合格原因，合格或未完成时为 None。
    pub fn failure_reason(&self) -> Option<&'static str> {
        if !self.is_operation_completed() || self.is_qualified() {
            return None;
        }
        Some(
            self.status
                .failure_reason()
                .unwrap_or("completed without a terminal status code"),
        )
    }
}
