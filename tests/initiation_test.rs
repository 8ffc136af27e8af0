mod common;

use clubpay::{
    domain::{InterimPaymentStatus, PaymentPurpose, PaymentStatus},
    error::{AppError, GatewayError},
    payments::{FakeGateway, GatewayCall},
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use common::{count_rows, event_request, spawn_app, CLUB_ID, EVENT_ID, PAYER_ID};

#[tokio::test]
async fn test_initiate_event_payment() -> anyhow::Result<()> {
    let app = spawn_app(FakeGateway::new().with_next_order("OT-1")).await?;

    let initiated = app.context.payment_service.initiate(event_request(500)).await?;
    assert_eq!(initiated.order_tracking_id, "OT-1");
    assert_eq!(initiated.redirect_url, "https://gateway.test/checkout/OT-1");

    let payment = app
        .context
        .payment_repo
        .find_by_id(initiated.payment_id)
        .await?
        .expect("payment");
    assert_eq!(payment.status, PaymentStatus::Pending);
    assert_eq!(payment.purpose, PaymentPurpose::Event);
    assert_eq!(payment.related_id, EVENT_ID);
    assert_eq!(payment.payer_id, PAYER_ID);
    assert_eq!(payment.amount, dec!(500));

    let interim = app
        .context
        .payment_repo
        .find_interim_by_tracking_id("OT-1")
        .await?
        .expect("session");
    assert_eq!(interim.payment_id, payment.id);
    assert_eq!(interim.status, InterimPaymentStatus::Saved);
    assert!(interim
        .merchant_reference
        .starts_with(&format!("PAYMENT_{}_", payment.id)));

    assert_eq!(
        app.gateway.registered_urls(),
        vec!["https://clubs.test/payments/gateway/ipn".to_string()]
    );

    let orders = app.gateway.submitted_orders();
    assert_eq!(orders.len(), 1);
    let order = &orders[0];
    assert_eq!(order.amount, dec!(500));
    assert_eq!(order.currency, "KES");
    assert_eq!(order.description, "Event registration payment for Spring Hackathon");
    assert_eq!(order.callback_url, "https://clubs.test/payments/gateway/callback");
    assert_eq!(order.notification_channel_id, "fake-ipn");
    assert_eq!(order.billing_address.first_name, "Amina");
    assert_eq!(order.billing_address.middle_name, "Wanjiru");
    assert_eq!(order.billing_address.last_name, "Kamau");
    assert_eq!(order.billing_address.country_code, "KE");

    assert!(app.events().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_initiate_membership_payment() -> anyhow::Result<()> {
    let app = spawn_app(FakeGateway::new()).await?;

    let mut request = event_request(1200);
    request.purpose = "membership".to_string();
    request.related_id = CLUB_ID;

    let initiated = app.context.payment_service.initiate(request).await?;
    assert!(initiated.order_tracking_id.starts_with("OT-FAKE-"));

    let orders = app.gateway.submitted_orders();
    assert_eq!(orders[0].description, "Membership payment for Chess Club");
    Ok(())
}

#[tokio::test]
async fn test_invalid_requests_create_nothing() -> anyhow::Result<()> {
    let app = spawn_app(FakeGateway::new()).await?;

    let mut unknown_purpose = event_request(500);
    unknown_purpose.purpose = "Donation".to_string();

    let mut missing_event = event_request(500);
    missing_event.related_id = 9999;

    let mut missing_club = event_request(500);
    missing_club.purpose = "Membership".to_string();
    missing_club.related_id = 9999;

    let mut zero_amount = event_request(500);
    zero_amount.amount = Decimal::ZERO;

    let mut blank_phone = event_request(500);
    blank_phone.phone_number = " ".to_string();

    for request in [unknown_purpose, missing_event, missing_club, zero_amount, blank_phone] {
        let err = app
            .context
            .payment_service
            .initiate(request)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)), "got {:?}", err);
    }

    assert_eq!(count_rows(&app.pool, "payments").await?, 0);
    assert_eq!(app.gateway.calls(GatewayCall::Token), 0);
    Ok(())
}

#[tokio::test]
async fn test_unreachable_gateway_leaves_payment_pending() -> anyhow::Result<()> {
    let app = spawn_app(FakeGateway::new()).await?;
    app.gateway.fail(
        GatewayCall::Submit,
        GatewayError::Transient("connection reset".to_string()),
    );

    let err = app
        .context
        .payment_service
        .initiate(event_request(500))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ServiceUnavailable(_)), "got {:?}", err);

    let payments = app.context.payment_repo.list(None).await?;
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].status, PaymentStatus::Pending);
    assert_eq!(count_rows(&app.pool, "interim_payments").await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_rejected_credentials_surface_as_external_error() -> anyhow::Result<()> {
    let app = spawn_app(FakeGateway::new()).await?;
    app.gateway.fail(
        GatewayCall::Token,
        GatewayError::Auth("invalid consumer key".to_string()),
    );

    let err = app
        .context
        .payment_service
        .initiate(event_request(500))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::External(_)), "got {:?}", err);
    assert_eq!(app.gateway.calls(GatewayCall::Register), 0);
    assert_eq!(app.gateway.calls(GatewayCall::Submit), 0);
    assert_eq!(count_rows(&app.pool, "interim_payments").await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_retry_after_failure_starts_a_new_payment() -> anyhow::Result<()> {
    let app = spawn_app(FakeGateway::new()).await?;
    app.gateway.fail(
        GatewayCall::Register,
        GatewayError::Transient("timed out".to_string()),
    );
    assert!(app.context.payment_service.initiate(event_request(500)).await.is_err());

    app.gateway.clear_failure(GatewayCall::Register);
    let initiated = app.context.payment_service.initiate(event_request(500)).await?;

    let payments = app.context.payment_repo.list(None).await?;
    assert_eq!(payments.len(), 2);
    assert_eq!(count_rows(&app.pool, "interim_payments").await?, 1);
    assert!(app
        .context
        .payment_repo
        .find_interim_by_payment(initiated.payment_id)
        .await?
        .is_some());
    Ok(())
}
