use chrono::NaiveDate;

#[derive(Debug, PartialEq, Eq)]
pub enum EngineError {
    NotFound(String),
    /// A room edit named a different day than the one the booking is on.
    DateMismatch {
        id: String,
        stored: NaiveDate,
        requested: NaiveDate,
    },
    LimitExceeded(&'static str),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::DateMismatch {
                id,
                stored,
                requested,
            } => write!(
                f,
                "appointment {id} is on {stored}, not {requested}"
            ),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}
