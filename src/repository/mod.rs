use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
use std::str::FromStr;
use std::time::Duration;
use crate::domain::*;
use crate::error::Result;

pub mod catalog_repository;
pub mod payment_repository;

pub use catalog_repository::SqliteCatalogRepository;
pub use payment_repository::SqlitePaymentRepository;

/// WAL journal plus a busy timeout, so concurrent ledger writers queue on
/// SQLite's write lock instead of failing with `SQLITE_BUSY`.
pub fn connect_options(url: &str) -> std::result::Result<SqliteConnectOptions, sqlx::Error> {
    Ok(SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(10))
        .foreign_keys(true))
}

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn create(&self, payment: NewPayment) -> Result<Payment>;
    async fn find_by_id(&self, id: i64) -> Result<Option<Payment>>;
    async fn find_by_payer(&self, payer_id: i64) -> Result<Vec<Payment>>;
    async fn list(&self, status: Option<PaymentStatus>) -> Result<Vec<Payment>>;

    /// Fails with `Conflict` if the order tracking id is already recorded or
    /// the payment already has an open session.
    async fn create_interim(&self, interim: NewInterimPayment) -> Result<InterimPayment>;
    async fn find_interim_by_tracking_id(&self, order_tracking_id: &str) -> Result<Option<InterimPayment>>;
    async fn find_interim_by_payment(&self, payment_id: i64) -> Result<Option<InterimPayment>>;

    /// Moves a `Pending` payment and its open session to a terminal state in
    /// one transaction. Returns `false` without writing anything if the
    /// payment is no longer `Pending`.
    async fn apply_transition(&self, payment_id: i64, transition: &PaymentTransition) -> Result<bool>;

    /// Pending payments created before `created_before` that never got a
    /// gateway session.
    async fn list_orphaned_pending(&self, created_before: DateTime<Utc>) -> Result<Vec<Payment>>;

    /// Open sessions created before `created_before` whose payment is still pending.
    async fn list_stale_sessions(&self, created_before: DateTime<Utc>) -> Result<Vec<InterimPayment>>;
}

/// Clubs and events are owned elsewhere; payments only look them up.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn find_club(&self, id: i64) -> Result<Option<Club>>;
    async fn find_event(&self, id: i64) -> Result<Option<Event>>;
}
