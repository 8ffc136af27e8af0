//! In-memory gateway for tests. Order ids, statuses and failures are
//! scripted up front; every call is counted.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::{
    error::GatewayError,
    payments::gateway::{AccessToken, OrderRequest, PaymentGateway, SubmittedOrder, TransactionStatus},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayCall {
    Token,
    Register,
    Submit,
    Status,
}

#[derive(Default)]
struct FakeState {
    next_orders: VecDeque<String>,
    statuses: HashMap<String, TransactionStatus>,
    failures: HashMap<GatewayCall, GatewayError>,
    calls: HashMap<GatewayCall, usize>,
    submitted: Vec<OrderRequest>,
    registered_urls: Vec<String>,
    order_counter: usize,
}

#[derive(Default)]
pub struct FakeGateway {
    state: Mutex<FakeState>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracking id the next submitted order will get.
    pub fn with_next_order(self, order_tracking_id: &str) -> Self {
        self.lock().next_orders.push_back(order_tracking_id.to_string());
        self
    }

    pub fn set_status(&self, order_tracking_id: &str, status: TransactionStatus) {
        self.lock().statuses.insert(order_tracking_id.to_string(), status);
    }

    /// Every subsequent `call` fails with `error` until cleared.
    pub fn fail(&self, call: GatewayCall, error: GatewayError) {
        self.lock().failures.insert(call, error);
    }

    pub fn clear_failure(&self, call: GatewayCall) {
        self.lock().failures.remove(&call);
    }

    pub fn calls(&self, call: GatewayCall) -> usize {
        self.lock().calls.get(&call).copied().unwrap_or(0)
    }

    pub fn submitted_orders(&self) -> Vec<OrderRequest> {
        self.lock().submitted.clone()
    }

    pub fn registered_urls(&self) -> Vec<String> {
        self.lock().registered_urls.clone()
    }

    pub fn completed(confirmation_code: &str, method: &str) -> TransactionStatus {
        TransactionStatus {
            status_description: Some("Completed".to_string()),
            confirmation_code: Some(confirmation_code.to_string()),
            payment_method: Some(method.to_string()),
            created_date: Some("2024-03-01T10:15:30.123".to_string()),
            ..Default::default()
        }
    }

    pub fn failed() -> TransactionStatus {
        TransactionStatus {
            status_description: Some("Failed".to_string()),
            ..Default::default()
        }
    }

    pub fn pending() -> TransactionStatus {
        TransactionStatus {
            status_description: Some("Pending".to_string()),
            ..Default::default()
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, call: GatewayCall) -> Result<(), GatewayError> {
        let mut state = self.lock();
        *state.calls.entry(call).or_insert(0) += 1;
        match state.failures.get(&call) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn get_access_token(&self) -> Result<AccessToken, GatewayError> {
        self.record(GatewayCall::Token)?;
        Ok(AccessToken::new("fake-token"))
    }

    async fn register_notification_endpoint(
        &self,
        _token: &AccessToken,
        url: &str,
    ) -> Result<String, GatewayError> {
        self.record(GatewayCall::Register)?;
        self.lock().registered_urls.push(url.to_string());
        Ok("fake-ipn".to_string())
    }

    async fn submit_order(
        &self,
        _token: &AccessToken,
        order: &OrderRequest,
    ) -> Result<SubmittedOrder, GatewayError> {
        self.record(GatewayCall::Submit)?;
        let mut state = self.lock();
        state.order_counter += 1;
        let order_tracking_id = match state.next_orders.pop_front() {
            Some(id) => id,
            None => format!("OT-FAKE-{}", state.order_counter),
        };
        state.submitted.push(order.clone());
        Ok(SubmittedOrder {
            redirect_url: format!("https://gateway.test/checkout/{}", order_tracking_id),
            merchant_reference: order.merchant_reference.clone(),
            order_tracking_id,
        })
    }

    async fn get_transaction_status(
        &self,
        _token: &AccessToken,
        order_tracking_id: &str,
    ) -> Result<TransactionStatus, GatewayError> {
        self.record(GatewayCall::Status)?;
        Ok(self
            .lock()
            .statuses
            .get(order_tracking_id)
            .cloned()
            .unwrap_or_else(Self::pending))
    }
}
