use reactrack_core::errors::{ChannelError, FulfillmentError};
use reactrack_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("fulfillment error: {0}")]
    Fulfillment(#[from] FulfillmentError),

    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),
}
