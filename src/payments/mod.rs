pub mod gateway;
pub mod http_client;

#[cfg(any(test, feature = "test-utils"))]
pub mod fake;

pub use gateway::{
    AccessToken, BillingAddress, GatewayVerdict, OrderRequest, PaymentGateway, SubmittedOrder,
    TransactionStatus,
};
pub use http_client::HttpGatewayClient;

#[cfg(any(test, feature = "test-utils"))]
pub use fake::{FakeGateway, GatewayCall};
