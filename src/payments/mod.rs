pub mod error;
pub mod gateway;
pub mod processor;
pub mod types;

pub use error::{GatewayError, GatewayResult};
pub use gateway::TransferGateway;
pub use processor::{ProcessorClient, ProcessorConfig};
pub use types::{GatewayEnvironment, TransferRequest, TransferResult, TransferState};
