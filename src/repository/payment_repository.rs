use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, SqlitePool};
use std::str::FromStr;

use crate::{
    domain::{
        InterimPayment, InterimPaymentStatus, NewInterimPayment, NewPayment, Payment,
        PaymentPurpose, PaymentStatus, PaymentTransition,
    },
    error::{AppError, Result},
    repository::PaymentRepository,
};

const PAYMENT_COLUMNS: &str = r#"
    id, amount, purpose, related_id, payer_id, status,
    payment_method, receipt_number, payment_date, is_manual,
    created_at, updated_at
"#;

const INTERIM_COLUMNS: &str = r#"
    id, payment_id, order_tracking_id, merchant_reference,
    redirect_url, status, created_at, updated_at
"#;

#[derive(FromRow)]
struct PaymentRow {
    id: i64,
    amount: String,
    purpose: String,
    related_id: i64,
    payer_id: i64,
    status: String,
    payment_method: Option<String>,
    receipt_number: Option<String>,
    payment_date: Option<NaiveDateTime>,
    is_manual: bool,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

#[derive(FromRow)]
struct InterimPaymentRow {
    id: i64,
    payment_id: i64,
    order_tracking_id: String,
    merchant_reference: String,
    redirect_url: String,
    status: String,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

pub struct SqlitePaymentRepository {
    pool: SqlitePool,
}

impl SqlitePaymentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_payment(row: PaymentRow) -> Result<Payment> {
        Ok(Payment {
            id: row.id,
            amount: Decimal::from_str(&row.amount)
                .map_err(|e| AppError::Database(format!("Invalid amount {}: {}", row.amount, e)))?,
            purpose: Self::parse_purpose(&row.purpose)?,
            related_id: row.related_id,
            payer_id: row.payer_id,
            status: Self::parse_payment_status(&row.status)?,
            payment_method: row.payment_method,
            receipt_number: row.receipt_number,
            payment_date: row.payment_date.map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc)),
            is_manual: row.is_manual,
            created_at: DateTime::from_naive_utc_and_offset(row.created_at, Utc),
            updated_at: DateTime::from_naive_utc_and_offset(row.updated_at, Utc),
        })
    }

    fn row_to_interim(row: InterimPaymentRow) -> Result<InterimPayment> {
        Ok(InterimPayment {
            id: row.id,
            payment_id: row.payment_id,
            order_tracking_id: row.order_tracking_id,
            merchant_reference: row.merchant_reference,
            redirect_url: row.redirect_url,
            status: Self::parse_interim_status(&row.status)?,
            created_at: DateTime::from_naive_utc_and_offset(row.created_at, Utc),
            updated_at: DateTime::from_naive_utc_and_offset(row.updated_at, Utc),
        })
    }

    fn parse_payment_status(s: &str) -> Result<PaymentStatus> {
        match s {
            "Pending" => Ok(PaymentStatus::Pending),
            "Completed" => Ok(PaymentStatus::Completed),
            "Failed" => Ok(PaymentStatus::Failed),
            _ => Err(AppError::Database(format!("Invalid payment status: {}", s))),
        }
    }

    fn payment_status_to_str(status: PaymentStatus) -> &'static str {
        match status {
            PaymentStatus::Pending => "Pending",
            PaymentStatus::Completed => "Completed",
            PaymentStatus::Failed => "Failed",
        }
    }

    fn parse_interim_status(s: &str) -> Result<InterimPaymentStatus> {
        match s {
            "Saved" => Ok(InterimPaymentStatus::Saved),
            "Completed" => Ok(InterimPaymentStatus::Completed),
            "Failed" => Ok(InterimPaymentStatus::Failed),
            _ => Err(AppError::Database(format!("Invalid interim payment status: {}", s))),
        }
    }

    fn interim_status_to_str(status: InterimPaymentStatus) -> &'static str {
        match status {
            InterimPaymentStatus::Saved => "Saved",
            InterimPaymentStatus::Completed => "Completed",
            InterimPaymentStatus::Failed => "Failed",
        }
    }

    fn parse_purpose(s: &str) -> Result<PaymentPurpose> {
        match s {
            "Membership" => Ok(PaymentPurpose::Membership),
            "Event" => Ok(PaymentPurpose::Event),
            _ => Err(AppError::Database(format!("Invalid payment purpose: {}", s))),
        }
    }

    fn purpose_to_str(purpose: PaymentPurpose) -> &'static str {
        match purpose {
            PaymentPurpose::Membership => "Membership",
            PaymentPurpose::Event => "Event",
        }
    }

    async fn fetch_payments(&self, sql: &str, bind: Option<String>) -> Result<Vec<Payment>> {
        let mut query = sqlx::query_as::<_, PaymentRow>(sql);
        if let Some(value) = bind {
            query = query.bind(value);
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter().map(Self::row_to_payment).collect()
    }
}

#[async_trait]
impl PaymentRepository for SqlitePaymentRepository {
    async fn create(&self, payment: NewPayment) -> Result<Payment> {
        let now = Utc::now().naive_utc();

        let result = sqlx::query(
            r#"
            INSERT INTO payments (
                amount, purpose, related_id, payer_id, status,
                is_manual, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, 0, ?, ?)
            "#
        )
        .bind(payment.amount.to_string())
        .bind(Self::purpose_to_str(payment.purpose))
        .bind(payment.related_id)
        .bind(payment.payer_id)
        .bind(Self::payment_status_to_str(PaymentStatus::Pending))
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        self.find_by_id(result.last_insert_rowid()).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve created payment".to_string())
        })
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Payment>> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE id = ?",
            PAYMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        row.map(Self::row_to_payment).transpose()
    }

    async fn find_by_payer(&self, payer_id: i64) -> Result<Vec<Payment>> {
        let rows = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE payer_id = ? ORDER BY created_at DESC, id DESC",
            PAYMENT_COLUMNS
        ))
        .bind(payer_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter().map(Self::row_to_payment).collect()
    }

    async fn list(&self, status: Option<PaymentStatus>) -> Result<Vec<Payment>> {
        match status {
            Some(status) => {
                self.fetch_payments(
                    &format!(
                        "SELECT {} FROM payments WHERE status = ? ORDER BY created_at DESC, id DESC",
                        PAYMENT_COLUMNS
                    ),
                    Some(Self::payment_status_to_str(status).to_string()),
                )
                .await
            }
            None => {
                self.fetch_payments(
                    &format!("SELECT {} FROM payments ORDER BY created_at DESC, id DESC", PAYMENT_COLUMNS),
                    None,
                )
                .await
            }
        }
    }

    async fn create_interim(&self, interim: NewInterimPayment) -> Result<InterimPayment> {
        let now = Utc::now().naive_utc();

        let result = sqlx::query(
            r#"
            INSERT INTO interim_payments (
                payment_id, order_tracking_id, merchant_reference,
                redirect_url, status, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#
        )
        .bind(interim.payment_id)
        .bind(&interim.order_tracking_id)
        .bind(&interim.merchant_reference)
        .bind(&interim.redirect_url)
        .bind(Self::interim_status_to_str(InterimPaymentStatus::Saved))
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => AppError::Conflict(format!(
                "Gateway session already recorded for order {} / payment {}",
                interim.order_tracking_id, interim.payment_id
            )),
            other => AppError::Database(other.to_string()),
        })?;

        let row = sqlx::query_as::<_, InterimPaymentRow>(&format!(
            "SELECT {} FROM interim_payments WHERE id = ?",
            INTERIM_COLUMNS
        ))
        .bind(result.last_insert_rowid())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Self::row_to_interim(row)
    }

    async fn find_interim_by_tracking_id(&self, order_tracking_id: &str) -> Result<Option<InterimPayment>> {
        let row = sqlx::query_as::<_, InterimPaymentRow>(&format!(
            "SELECT {} FROM interim_payments WHERE order_tracking_id = ?",
            INTERIM_COLUMNS
        ))
        .bind(order_tracking_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        row.map(Self::row_to_interim).transpose()
    }

    async fn find_interim_by_payment(&self, payment_id: i64) -> Result<Option<InterimPayment>> {
        let row = sqlx::query_as::<_, InterimPaymentRow>(&format!(
            "SELECT {} FROM interim_payments WHERE payment_id = ? ORDER BY id DESC LIMIT 1",
            INTERIM_COLUMNS
        ))
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        row.map(Self::row_to_interim).transpose()
    }

    async fn apply_transition(&self, payment_id: i64, transition: &PaymentTransition) -> Result<bool> {
        if !transition.status.is_terminal() {
            return Err(AppError::Internal("Transition target must be terminal".to_string()));
        }

        let now = Utc::now().naive_utc();
        let mut tx = self.pool.begin().await?;

        // The status guard makes this a compare-and-swap: concurrent callers
        // serialise on the write lock and only the first sees 'Pending'.
        let updated = sqlx::query(
            r#"
            UPDATE payments
            SET status = ?,
                receipt_number = ?,
                payment_method = ?,
                payment_date = ?,
                is_manual = ?,
                updated_at = ?
            WHERE id = ? AND status = 'Pending'
            "#
        )
        .bind(Self::payment_status_to_str(transition.status))
        .bind(&transition.receipt_number)
        .bind(&transition.payment_method)
        .bind(transition.payment_date.map(|dt| dt.naive_utc()))
        .bind(transition.is_manual)
        .bind(now)
        .bind(payment_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            UPDATE interim_payments
            SET status = ?, updated_at = ?
            WHERE payment_id = ? AND status = 'Saved'
            "#
        )
        .bind(Self::interim_status_to_str(transition.interim_status()))
        .bind(now)
        .bind(payment_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        tx.commit().await?;
        Ok(true)
    }

    async fn list_orphaned_pending(&self, created_before: DateTime<Utc>) -> Result<Vec<Payment>> {
        let rows = sqlx::query_as::<_, PaymentRow>(&format!(
            r#"
            SELECT {} FROM payments p
            WHERE p.status = 'Pending'
              AND p.created_at < ?
              AND NOT EXISTS (SELECT 1 FROM interim_payments i WHERE i.payment_id = p.id)
            ORDER BY p.created_at
            "#,
            PAYMENT_COLUMNS
        ))
        .bind(created_before.naive_utc())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter().map(Self::row_to_payment).collect()
    }

    async fn list_stale_sessions(&self, created_before: DateTime<Utc>) -> Result<Vec<InterimPayment>> {
        let rows = sqlx::query_as::<_, InterimPaymentRow>(
            r#"
            SELECT i.id, i.payment_id, i.order_tracking_id, i.merchant_reference,
                   i.redirect_url, i.status, i.created_at, i.updated_at
            FROM interim_payments i
            JOIN payments p ON p.id = i.payment_id
            WHERE p.status = 'Pending'
              AND i.status = 'Saved'
              AND i.created_at < ?
            ORDER BY i.created_at
            "#
        )
        .bind(created_before.naive_utc())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter().map(Self::row_to_interim).collect()
    }
}
