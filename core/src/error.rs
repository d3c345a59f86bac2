use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlanError {
    #[error("Hour index {hour} outside 1..={max}")]
    Range { hour: i64, max: i64 },

    #[error("Interval key ({season}, {day}, {period}) out of range")]
    KeyRange { season: u32, day: u32, period: u32 },

    #[error("Malformed interval key '{key}': {reason}")]
    Format { key: String, reason: String },

    #[error("No region id for '{region}' under parameter '{parameter}'")]
    Lookup { parameter: String, region: String },

    #[error("{kind} '{id}' is not in the requested index set")]
    IndexOutOfSet { kind: &'static str, id: String },

    #[error("Unknown sector '{sector}' for intervention '{intervention}'")]
    UnknownSector { sector: String, intervention: String },

    #[error("Intervention '{name}' already exists in sector '{sector}'")]
    DuplicateIntervention { sector: String, name: String },

    #[error("'{0}' cannot be used as a table or column name")]
    InvalidIdentifier(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Run cancelled before year {year}")]
    Cancelled { year: i64 },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PlanError {
    /// Errors confined to a single source record. Importers report these
    /// and move on; everything else aborts the operation.
    pub fn is_record_error(&self) -> bool {
        matches!(
            self,
            PlanError::UnknownSector { .. }
                | PlanError::DuplicateIntervention { .. }
                | PlanError::InvalidIdentifier(_)
                | PlanError::Lookup { .. }
        )
    }
}

pub type PlanResult<T> = Result<T, PlanError>;
