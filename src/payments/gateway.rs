use crate::payments::error::GatewayResult;
use crate::payments::types::{TransferRequest, TransferResult};
use async_trait::async_trait;
use mockall::automock;

/// Creates transfers at the payment processor.
///
/// Implementations make exactly one attempt per call. A processor rejection
/// comes back as `Ok` with a FAILED state; `Err` means no usable answer was
/// received (timeout, transport failure, unparseable body).
#[automock]
#[async_trait]
pub trait TransferGateway: Send + Sync {
    async fn create_transfer(&self, request: TransferRequest) -> GatewayResult<TransferResult>;
}
