use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConsumerError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("No handler registered for event type: {0}")]
    NoHandler(String),

    #[error("Handler error: {0}")]
    Handler(String),

    #[error("Not connected to broker")]
    NotConnected,

    #[error("Consumer is disabled")]
    Disabled,
}
