use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One logical payment intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: i64,
    pub amount: Decimal,
    pub purpose: PaymentPurpose,
    /// Club id for memberships, event id for event registrations.
    pub related_id: i64,
    pub payer_id: i64,
    pub status: PaymentStatus,
    pub payment_method: Option<String>,
    pub receipt_number: Option<String>,
    pub payment_date: Option<DateTime<Utc>>,
    pub is_manual: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PaymentPurpose {
    Membership,
    Event,
}

impl std::str::FromStr for PaymentPurpose {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            s if s.eq_ignore_ascii_case("membership") => Ok(PaymentPurpose::Membership),
            s if s.eq_ignore_ascii_case("event") => Ok(PaymentPurpose::Event),
            other => Err(format!("Invalid purpose: {}", other)),
        }
    }
}

/// `Pending` is the only non-terminal state. Nothing leaves `Completed` or
/// `Failed`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

impl PaymentStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub amount: Decimal,
    pub purpose: PaymentPurpose,
    pub related_id: i64,
    pub payer_id: i64,
}

/// The local record of one gateway checkout session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterimPayment {
    pub id: i64,
    pub payment_id: i64,
    pub order_tracking_id: String,
    pub merchant_reference: String,
    pub redirect_url: String,
    pub status: InterimPaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum InterimPaymentStatus {
    Saved,
    Completed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct NewInterimPayment {
    pub payment_id: i64,
    pub order_tracking_id: String,
    pub merchant_reference: String,
    pub redirect_url: String,
}

/// A terminal transition for a pending payment. Applied by the ledger only
/// while the payment is still `Pending`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentTransition {
    pub status: PaymentStatus,
    pub receipt_number: Option<String>,
    pub payment_method: Option<String>,
    pub payment_date: Option<DateTime<Utc>>,
    pub is_manual: bool,
}

impl PaymentTransition {
    pub fn completed(
        receipt_number: Option<String>,
        payment_method: String,
        payment_date: DateTime<Utc>,
    ) -> Self {
        Self {
            status: PaymentStatus::Completed,
            receipt_number,
            payment_method: Some(payment_method),
            payment_date: Some(payment_date),
            is_manual: false,
        }
    }

    pub fn failed() -> Self {
        Self {
            status: PaymentStatus::Failed,
            receipt_number: None,
            payment_method: None,
            payment_date: None,
            is_manual: false,
        }
    }

    pub fn manual(mut self) -> Self {
        self.is_manual = true;
        self
    }

    /// Status the gateway session moves to alongside the payment.
    pub fn interim_status(&self) -> InterimPaymentStatus {
        match self.status {
            PaymentStatus::Completed => InterimPaymentStatus::Completed,
            _ => InterimPaymentStatus::Failed,
        }
    }
}

/// Which notification path asked for a reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationChannel {
    Redirect,
    Ipn,
    Sweep,
}

impl std::fmt::Display for NotificationChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationChannel::Redirect => write!(f, "redirect"),
            NotificationChannel::Ipn => write!(f, "ipn"),
            NotificationChannel::Sweep => write!(f, "sweep"),
        }
    }
}

/// What a reconciliation did to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// This call moved the payment out of `Pending`.
    Transitioned(PaymentStatus),
    /// The payment was already terminal, or another caller won the race.
    AlreadyTerminal(PaymentStatus),
    /// The gateway has no final answer yet.
    StillPending,
}

#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub payment: Payment,
    pub outcome: ReconcileOutcome,
}
