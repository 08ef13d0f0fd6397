use crate::domain::ConversationError;
use crate::infrastructure::model::ModelError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("invalid budget: {0}")]
    InvalidBudget(String),
    #[error("conversation rejected tool results: {0}")]
    Conversation(#[from] ConversationError),
}

impl EngineError {
    pub fn user_message(&self) -> String {
        match self {
            EngineError::Model(err) => err.user_message(),
            EngineError::InvalidBudget(reason) => {
                format!("The task's token budget is not usable: {reason}.")
            }
            EngineError::Conversation(_) => {
                "The model returned tool calls that could not be answered. Try again.".to_string()
            }
        }
    }
}
