//! Status transitions for runs and task records.
//!
//! Both follow `PENDING → RUNNING → {SUCCESS | FAILED | CANCELLED}`; a
//! terminal status may also be reached straight from `PENDING`.  Anything
//! else is rejected with [`EngineError::InvalidTransition`] and leaves the
//! record untouched.

use chrono::{DateTime, Utc};

use crate::{
    EngineError,
    models::{PipelineRun, PipelineTask, Status},
};

fn check(entity: &'static str, from: Status, to: Status) -> Result<(), EngineError> {
    let allowed = match (from, to) {
        (Status::Pending, Status::Running) => true,
        (Status::Pending | Status::Running, to) => to.is_terminal(),
        _ => false,
    };

    if allowed {
        Ok(())
    } else {
        Err(EngineError::InvalidTransition { entity, from, to })
    }
}

/// Apply the timestamp rules shared by runs and tasks.
fn stamp(
    to: Status,
    now: DateTime<Utc>,
    start_time: &mut Option<DateTime<Utc>>,
    end_time: &mut Option<DateTime<Utc>>,
) {
    if to == Status::Running {
        start_time.get_or_insert(now);
    }
    if to.is_terminal() {
        *end_time = Some(now);
    }
}

impl PipelineRun {
    /// Move the run to `to`, stamping `start_time`/`end_time`.
    ///
    /// `error` is recorded when the run fails.
    pub fn transition(
        &mut self,
        to: Status,
        error: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        check("run", self.status, to)?;
        stamp(to, now, &mut self.start_time, &mut self.end_time);
        if to == Status::Failed && error.is_some() {
            self.error_message = error;
        }
        self.status = to;
        self.updated_at = now;
        Ok(())
    }

    /// `PENDING → RUNNING` on first dispatch; a no-op once running.
    pub fn mark_running(&mut self, now: DateTime<Utc>) -> Result<(), EngineError> {
        if self.status == Status::Running {
            return Ok(());
        }
        self.transition(Status::Running, None, now)
    }
}

impl PipelineTask {
    /// Move the task to `to`, stamping `start_time`/`end_time`.
    pub fn transition(&mut self, to: Status, now: DateTime<Utc>) -> Result<(), EngineError> {
        check("task", self.status, to)?;
        stamp(to, now, &mut self.start_time, &mut self.end_time);
        self.status = to;
        self.updated_at = now;
        Ok(())
    }
}
