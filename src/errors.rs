use thiserror::Error;

/// Fatal errors. Anything else in the pipeline degrades gracefully:
/// bad flag lines, malformed slow-log lines and unparseable durations are
/// skipped, and advisory failures fall back to heuristic output.
#[derive(Debug, Error)]
pub enum TuneError {
    #[error("can't read {path}: {source}")]
    Input {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("metrics file {path} is not a JSON object of numeric values: {source}")]
    BadMetrics {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("can't write report {path}: {source}")]
    Output {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Usage(String),
}

pub type Result<T> = std::result::Result<T, TuneError>;

/// Everything that can go wrong talking to the reasoning service.
/// None of these ever surface to the caller of the refiner - they all
/// collapse into the heuristic fallback path.
#[derive(Debug, Error)]
pub enum AdvisoryError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("service returned HTTP {status}: {body}")]
    Service { status: u16, body: String },

    #[error("response carried no message text")]
    EmptyResponse,

    #[error("response is not parseable JSON: {0}")]
    BadPayload(#[from] serde_json::Error),

    #[error("response JSON is not an array of findings")]
    NotAnArray,
}
