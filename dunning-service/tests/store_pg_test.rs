//! Postgres store tests. These run only when TEST_DATABASE_URL points at a
//! disposable database; without it every test skips cleanly.

use chrono::NaiveDate;
use dunning_service::models::{NormalizedDebtor, NormalizedInvoice, PaymentStatus};
use dunning_service::services::{Database, ReconciliationStore};
use rust_decimal::Decimal;
use serde_json::json;
use serial_test::serial;

async fn test_db() -> Option<Database> {
    let url = match std::env::var("TEST_DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("TEST_DATABASE_URL not set, skipping");
            return None;
        }
    };
    let db = Database::new(&url, 5, 1).await.expect("connect test db");
    db.run_migrations().await.expect("run migrations");
    sqlx::query(
        "TRUNCATE customers, cached_invoices, manual_mappings, counterparty_exceptions",
    )
    .execute(db.pool())
    .await
    .expect("truncate tables");
    Some(db)
}

fn debtor(name: &str) -> NormalizedDebtor {
    NormalizedDebtor {
        posting_account_number: 0,
        name: name.to_string(),
        email: Some("billing@example.test".to_string()),
        city: Some("Berlin".to_string()),
        ..Default::default()
    }
}

fn invoice(external_id: &str, number: i64) -> NormalizedInvoice {
    NormalizedInvoice {
        external_id: external_id.to_string(),
        invoice_number: Some("RE-100".to_string()),
        counterparty_name: Some("Musterfirma GmbH".to_string()),
        receipt_date: NaiveDate::from_ymd_opt(2026, 1, 10),
        due_date: NaiveDate::from_ymd_opt(2026, 1, 24),
        total_amount: Decimal::new(120000, 2),
        open_amount: Decimal::new(120000, 2),
        payment_status: PaymentStatus::Unpaid,
        posting_account_number: number,
        raw_payload: json!({ "id": external_id }),
    }
}

#[tokio::test]
#[serial]
async fn customer_upsert_roundtrip() {
    let Some(db) = test_db().await else { return };

    let created = db
        .create_customer(70001, &debtor("Alpha Handel GmbH"), Some("hash-1"))
        .await
        .unwrap();
    assert_eq!(created.posting_account_number, 70001);
    assert_eq!(created.last_sync_hash.as_deref(), Some("hash-1"));

    let mut changed = debtor("Alpha Handel GmbH");
    changed.email = Some("accounts@alpha.test".to_string());
    db.update_customer(created.customer_id, &changed, "hash-2")
        .await
        .unwrap();

    let fetched = db.get_customer_by_number(70001).await.unwrap().unwrap();
    assert_eq!(fetched.email.as_deref(), Some("accounts@alpha.test"));
    assert_eq!(fetched.last_sync_hash.as_deref(), Some("hash-2"));
}

#[tokio::test]
#[serial]
async fn renumbering_moves_invoices_atomically() {
    let Some(db) = test_db().await else { return };

    let placeholder = db
        .create_customer(80007, &debtor("Musterfirma GmbH"), None)
        .await
        .unwrap();
    db.insert_invoice(&invoice("inv-1", 80007)).await.unwrap();
    db.insert_invoice(&invoice("inv-2", 80007)).await.unwrap();

    db.renumber_customer(
        placeholder.customer_id,
        80007,
        70003,
        &debtor("Musterfirma GmbH"),
        "hash-1",
    )
    .await
    .unwrap();

    assert!(db.get_customer_by_number(80007).await.unwrap().is_none());
    let moved = db.get_customer_by_number(70003).await.unwrap().unwrap();
    assert_eq!(moved.customer_id, placeholder.customer_id);

    let invoices = db.list_invoices_for_customer(70003).await.unwrap();
    assert_eq!(invoices.len(), 2);
    assert!(db.list_invoices_for_customer(80007).await.unwrap().is_empty());
}

#[tokio::test]
#[serial]
async fn stale_renumbering_rolls_back() {
    let Some(db) = test_db().await else { return };

    let placeholder = db
        .create_customer(80007, &debtor("Musterfirma GmbH"), None)
        .await
        .unwrap();
    db.insert_invoice(&invoice("inv-1", 80007)).await.unwrap();

    // Wrong old number: the customer row does not match, so the invoice
    // rewrite in the same transaction must be undone.
    let err = db
        .renumber_customer(
            placeholder.customer_id,
            80008,
            70003,
            &debtor("Musterfirma GmbH"),
            "hash-1",
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        service_core::error::AppError::Conflict(_)
    ));

    assert!(db.get_customer_by_number(80007).await.unwrap().is_some());
    assert_eq!(db.list_invoices_for_customer(80007).await.unwrap().len(), 1);
}

#[tokio::test]
#[serial]
async fn placeholder_numbers_are_sequential() {
    let Some(db) = test_db().await else { return };

    assert_eq!(db.next_placeholder_number().await.unwrap(), 80000);
    db.create_customer(80000, &debtor("Firma A"), None)
        .await
        .unwrap();
    db.create_customer(80001, &debtor("Firma B"), None)
        .await
        .unwrap();
    // Regular numbers below the placeholder range never influence the counter.
    db.create_customer(70001, &debtor("Firma C"), None)
        .await
        .unwrap();
    assert_eq!(db.next_placeholder_number().await.unwrap(), 80002);
}

#[tokio::test]
#[serial]
async fn shared_handle_serves_read_accessors() {
    let Some(db) = test_db().await else { return };
    // The HTTP handlers hold the store behind a shared handle; the read
    // accessors must resolve through it.
    let db = std::sync::Arc::new(db);

    db.create_customer(70001, &debtor("Alpha Handel GmbH"), None)
        .await
        .unwrap();
    db.insert_invoice(&invoice("inv-1", 70001)).await.unwrap();

    assert!(db.get_customer_by_number(70001).await.unwrap().is_some());
    assert_eq!(db.list_invoices_for_customer(70001).await.unwrap().len(), 1);
    assert!(db.list_unmatched_counterparties().await.unwrap().is_empty());
}

#[tokio::test]
#[serial]
async fn unmatched_counterparties_exclude_mapped_and_excepted() {
    let Some(db) = test_db().await else { return };

    db.insert_invoice(&{
        let mut i = invoice("inv-1", 0);
        i.counterparty_name = Some("Alpha Handel".to_string());
        i
    })
    .await
    .unwrap();
    db.insert_invoice(&{
        let mut i = invoice("inv-2", 0);
        i.counterparty_name = Some("Beta Logistik".to_string());
        i
    })
    .await
    .unwrap();
    db.insert_invoice(&{
        let mut i = invoice("inv-3", 0);
        i.counterparty_name = Some("Gamma Consulting".to_string());
        i
    })
    .await
    .unwrap();

    db.create_manual_mapping("Beta Logistik", 70001).await.unwrap();
    db.create_exception("Gamma Consulting").await.unwrap();

    let unmatched = db.list_unmatched_counterparties().await.unwrap();
    assert_eq!(unmatched, vec!["Alpha Handel".to_string()]);
}
