//! Job status enum mapping to the `jobs.status_id` column.

/// Status ID type matching the INTEGER column.
pub type StatusId = i16;

/// Job lifecycle status. Discriminants are the stored ids (1-based).
#[repr(i16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// Accepted, waiting for a pool slot and the resource lock.
    Queued = 1,
    /// The execution loop is running.
    Running = 2,
    /// Completion confirmed.
    Done = 3,
    /// Terminated by a failure (including ResourceBusy).
    Error = 4,
    /// Terminated without a failure: cooperative abort, or the batch budget
    /// ran out before completion was confirmed.
    Stopped = 5,
}

impl JobStatus {
    /// Return the database status ID.
    pub fn id(self) -> StatusId {
        self as StatusId
    }

    pub fn from_id(id: StatusId) -> Option<Self> {
        match id {
            1 => Some(Self::Queued),
            2 => Some(Self::Running),
            3 => Some(Self::Done),
            4 => Some(Self::Error),
            5 => Some(Self::Stopped),
            _ => None,
        }
    }

    /// Terminal statuses accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error | Self::Stopped)
    }

    /// Lower-case wire name used in API payloads and events.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Done => "done",
            Self::Error => "error",
            Self::Stopped => "stopped",
        }
    }
}

impl From<JobStatus> for StatusId {
    fn from(value: JobStatus) -> Self {
        value as StatusId
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_round_trip() {
        for status in [
            JobStatus::Queued,
            JobStatus::Running,
            JobStatus::Done,
            JobStatus::Error,
            JobStatus::Stopped,
        ] {
            assert_eq!(JobStatus::from_id(status.id()), Some(status));
        }
    }

    #[test]
    fn unknown_id_is_none() {
        assert_eq!(JobStatus::from_id(99), None);
    }

    #[test]
    fn terminal_classification() {
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Done.is_terminal());
        assert!(JobStatus::Error.is_terminal());
        assert!(JobStatus::Stopped.is_terminal());
    }
}
