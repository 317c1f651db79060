use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One logical conversation, independent of any connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Client-chosen session id.
    pub session_id: String,
    /// User who started the session.
    pub user_id: String,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// Last task change.
    pub updated_at: DateTime<Utc>,
    /// The task currently running for this session, if any.
    #[serde(default)]
    pub current_task: Option<Uuid>,
}

impl Session {
    /// A session with no running task.
    pub fn new(session_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            created_at: now,
            updated_at: now,
            current_task: None,
        }
    }

    /// Records `task_id` as the running task.
    pub fn begin_task(&mut self, task_id: Uuid) {
        self.updated_at = Utc::now();
        self.current_task = Some(task_id);
    }

    /// Clears the current task if it is still `task_id`.
    pub fn end_task(&mut self, task_id: Uuid) {
        if self.current_task == Some(task_id) {
            self.updated_at = Utc::now();
            self.current_task = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_tracking() {
        let mut session = Session::new("sess-1", "alice");
        assert!(session.current_task.is_none());

        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        session.begin_task(first);
        session.begin_task(second);

        // A late terminal for the first task must not clear the second.
        session.end_task(first);
        assert_eq!(session.current_task, Some(second));

        session.end_task(second);
        assert!(session.current_task.is_none());
    }
}
