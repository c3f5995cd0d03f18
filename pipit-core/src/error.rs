use std::fmt;

use pipit_audio::ScheduleError;

pub type TunerResult<T = ()> = Result<T, TunerError>;

#[derive(Debug, Clone, PartialEq)]
pub enum TunerError {
    /// Out-of-range slot or channel access
    Index {
        pool: &'static str,
        index: usize,
        len: usize,
    },
    /// Malformed caller input: processor pair, pattern JSON
    Config(String),
    /// A scheduling pass failed while starting playback
    Schedule(ScheduleError),
}

impl fmt::Display for TunerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TunerError::Index { pool, index, len } => {
                write!(f, "{} index {} out of range (size {})", pool, index, len)
            }
            TunerError::Config(msg) => write!(f, "configuration error: {}", msg),
            TunerError::Schedule(e) => write!(f, "scheduling failed: {}", e),
        }
    }
}

impl std::error::Error for TunerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TunerError::Schedule(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ScheduleError> for TunerError {
    fn from(e: ScheduleError) -> Self {
        TunerError::Schedule(e)
    }
}

impl From<serde_json::Error> for TunerError {
    fn from(e: serde_json::Error) -> Self {
        TunerError::Config(e.to_string())
    }
}

/// Bounds check against a fixed-size pool.
pub(crate) fn check_index(pool: &'static str, index: usize, len: usize) -> TunerResult {
    if index < len {
        Ok(())
    } else {
        Err(TunerError::Index { pool, index, len })
    }
}
