//! 完成判定器
//!
//! 每个拧紧周期只宣告一次完成：启动（或观察到控制字 100）时上膛，
//! 命中完成条件后撤膛，直到下一个周期。
//! 100 → 0 跳变只认实际读到的控制字，启动后读到的旧采样不会被当成跳变。

use domain::{COMMAND_START, CompletionSignal, detect_completion};

#[derive(Debug, Clone, Default)]
pub struct CompletionDetector {
    previous_command: Option<u16>,
    armed: bool,
}

impl CompletionDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// 下发启动后上膛；上一拍控制字清空，等轴回读到 100 再判跳变
    pub fn arm(&mut self) {
        self.armed = true;
        self.previous_command = None;
    }

    pub fn disarm(&mut self) {
        self.armed = false;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn previous_command(&self) -> Option<u16> {
        self.previous_command
    }

    /// 观察一次采样，返回本周期首次命中的完成条件
    pub fn observe(
        &mut self,
        command: u16,
        status_code: u16,
        completed_torque: f64,
    ) -> Option<CompletionSignal> {
        if command == COMMAND_START {
            self.armed = true;
        }
        let signal = if self.armed {
            detect_completion(self.previous_command, command, status_code, completed_torque)
        } else {
            None
        };
        self.previous_command = Some(command);
        if signal.is_some() {
            self.armed = false;
        }
        signal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declares_once_per_cycle() {
        let mut detector = CompletionDetector::new();
        assert_eq!(detector.observe(100, 0, 0.0), None);
        assert_eq!(detector.observe(100, 3, 12.0), None);
        assert_eq!(
            detector.observe(0, 10, 29.1),
            Some(CompletionSignal::CommandTransition)
        );
        // 轴停在终态，后续采样不再重复宣告
        assert_eq!(detector.observe(0, 10, 29.1), None);
        assert_eq!(detector.observe(0, 10, 29.1), None);

        // 下一周期
        assert_eq!(detector.observe(100, 0, 0.0), None);
        assert_eq!(
            detector.observe(0, 22, 31.0),
            Some(CompletionSignal::CommandTransition)
        );
    }

    #[test]
    fn test_unarmed_detector_stays_quiet() {
        let mut detector = CompletionDetector::new();
        assert_eq!(detector.observe(0, 10, 29.1), None);
        assert_eq!(detector.observe(0, 0, 5.0), None);
        assert_eq!(detector.previous_command(), Some(0));
    }

    #[test]
    fn test_armed_fallbacks() {
        let mut detector = CompletionDetector::new();
        detector.arm();
        // 启动后的第一拍读到旧的空闲块，不算完成
        assert_eq!(detector.observe(0, 0, 0.0), None);
        assert!(detector.is_armed());
        assert_eq!(detector.observe(100, 0, 0.0), None);
        assert_eq!(
            detector.observe(0, 0, 0.0),
            Some(CompletionSignal::CommandTransition)
        );

        detector.arm();
        assert_eq!(detector.observe(100, 0, 0.0), None);
        // 中间丢了一拍，控制字 0 → 0 但终态已出现
        detector.previous_command = Some(0);
        assert_eq!(
            detector.observe(0, 23, 0.0),
            Some(CompletionSignal::TerminalStatus)
        );

        detector.arm();
        detector.previous_command = Some(0);
        assert_eq!(
            detector.observe(0, 0, 28.7),
            Some(CompletionSignal::CompletedTorque)
        );
        assert!(!detector.is_armed());
    }
}
