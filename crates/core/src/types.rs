/// Client-assigned identifier of a local video record (UUID v4 string).
pub type LocalId = String;

/// Remote-assigned identifier of a persisted video row.
pub type BackendId = String;

/// Remote-assigned identifier of a survey.
pub type SurveyId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
