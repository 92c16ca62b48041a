mod evaluation;
mod history_api;

pub use evaluation::EvaluationResult;
pub use history_api::{HistoryApiClient, RemoteHistory};
