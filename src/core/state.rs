//! 会话状态机
//!
//! 每个会话一个 SessionStateMachine：IDLE / RUNNING / ERROR / COMPLETED 四态，
//! transition_to 按固定白名单校验，失败的迁移不做任何修改；ERROR 时保存错误上下文，
//! 回到 IDLE / COMPLETED 时清空。get_state_info 只暴露最近 5 条迁移记录。

use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// get_state_info 中暴露的迁移记录条数
pub const STATE_INFO_HISTORY: usize = 5;
/// 内部保留的迁移记录上限，超出后丢弃最旧的
const TRANSITION_LOG_CAPACITY: usize = 100;

/// 会话生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Running,
    Error,
    Completed,
}

impl SessionState {
    pub const ALL: [SessionState; 4] = [
        SessionState::Idle,
        SessionState::Running,
        SessionState::Error,
        SessionState::Completed,
    ];

    /// 该状态允许迁移到的目标状态
    pub fn allowed_targets(self) -> &'static [SessionState] {
        match self {
            SessionState::Idle => &[SessionState::Running, SessionState::Error],
            SessionState::Running => &[SessionState::Completed, SessionState::Error],
            SessionState::Error => &[SessionState::Running, SessionState::Idle],
            SessionState::Completed => &[
                SessionState::Idle,
                SessionState::Running,
                SessionState::Error,
            ],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Running => "running",
            SessionState::Error => "error",
            SessionState::Completed => "completed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单条迁移记录（追加后不可变）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTransitionRecord {
    pub from_state: SessionState,
    pub to_state: SessionState,
    pub timestamp: String,
    pub error_context: Option<Map<String, Value>>,
}

/// 只读状态快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateInfo {
    pub session_id: String,
    pub current_state: SessionState,
    pub error_context: Option<Map<String, Value>>,
    pub last_transition_time: String,
    pub state_history: Vec<StateTransitionRecord>,
}

#[derive(Debug, Clone)]
pub struct SessionStateMachine {
    session_id: String,
    current_state: SessionState,
    error_context: Option<Map<String, Value>>,
    transition_log: VecDeque<StateTransitionRecord>,
    last_transition_time: DateTime<Utc>,
}

impl SessionStateMachine {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            current_state: SessionState::Idle,
            error_context: None,
            transition_log: VecDeque::new(),
            last_transition_time: Utc::now(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn current_state(&self) -> SessionState {
        self.current_state
    }

    pub fn error_context(&self) -> Option<&Map<String, Value>> {
        self.error_context.as_ref()
    }

    pub fn last_transition_time(&self) -> DateTime<Utc> {
        self.last_transition_time
    }

    /// 当前保留的迁移记录（最旧在前，不保证完整）
    pub fn history(&self) -> impl Iterator<Item = &StateTransitionRecord> {
        self.transition_log.iter()
    }

    pub fn history_len(&self) -> usize {
        self.transition_log.len()
    }

    pub fn can_transition(&self, target: SessionState) -> bool {
        self.current_state.allowed_targets().contains(&target)
    }

    /// 迁移到 target；不合法时返回 false 且不改动任何字段
    pub fn transition_to(
        &mut self,
        target: SessionState,
        error_context: Option<Map<String, Value>>,
    ) -> bool {
        if !self.can_transition(target) {
            tracing::debug!(
                session_id = %self.session_id,
                from = %self.current_state,
                to = %target,
                "rejected state transition"
            );
            return false;
        }

        let now = Utc::now();
        if self.transition_log.len() == TRANSITION_LOG_CAPACITY {
            self.transition_log.pop_front();
        }
        self.transition_log.push_back(StateTransitionRecord {
            from_state: self.current_state,
            to_state: target,
            timestamp: now.to_rfc3339(),
            error_context: error_context.clone(),
        });

        self.current_state = target;
        self.last_transition_time = now;

        match target {
            SessionState::Error => self.error_context = error_context,
            SessionState::Completed | SessionState::Idle => self.error_context = None,
            SessionState::Running => {}
        }

        true
    }

    pub fn get_state_info(&self) -> StateInfo {
        let skip = self.transition_log.len().saturating_sub(STATE_INFO_HISTORY);
        StateInfo {
            session_id: self.session_id.clone(),
            current_state: self.current_state,
            error_context: self.error_context.clone(),
            last_transition_time: self.last_transition_time.to_rfc3339(),
            state_history: self.transition_log.iter().skip(skip).cloned().collect(),
        }
    }

    /// 无条件回到 IDLE，清空历史与错误上下文
    pub fn reset(&mut self) {
        self.current_state = SessionState::Idle;
        self.error_context = None;
        self.transition_log.clear();
        self.last_transition_time = Utc::now();
    }

    /// 测试辅助：直接置为某状态（不记录历史）
    #[cfg(test)]
    pub(crate) fn force_state(&mut self, state: SessionState) {
        self.current_state = state;
    }
}
