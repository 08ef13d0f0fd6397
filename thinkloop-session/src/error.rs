use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to serialize session '{session}': {source}")]
    Serialize {
        session: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to restore session '{session}': {source}")]
    Deserialize {
        session: String,
        #[source]
        source: serde_json::Error,
    },
}

impl SessionError {
    pub fn user_message(&self) -> String {
        match self {
            SessionError::Serialize { session, .. } => {
                format!("Chat history for session '{session}' could not be saved.")
            }
            SessionError::Deserialize { session, .. } => {
                format!("Chat history for session '{session}' is corrupted and was not restored.")
            }
        }
    }
}
