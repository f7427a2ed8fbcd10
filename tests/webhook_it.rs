// std
use std::sync::{
	Arc,
	atomic::{AtomicUsize, Ordering},
};
// crates.io
use serde_json::json;
// self
use hospitable_client::webhook::{
	DeliveryLedger, EnvelopeId, LedgerError, LedgerFuture, MemoryLedger, WebhookError,
	WebhookVerifier, sign,
};

const SECRET: &str = "whsec_integration";

fn delivery(id: &EnvelopeId, action: &str) -> Vec<u8> {
	serde_json::to_vec(&json!({
		"id": id,
		"action": action,
		"data": { "id": "res-42", "platform": "airbnb", "guests": { "adult_count": 2 } },
		"created": "2025-04-12T09:30:00Z",
		"version": "v2"
	}))
	.expect("Delivery fixture should serialize.")
}

/// Ledger that refuses every lookup.
struct OfflineLedger(AtomicUsize);
impl DeliveryLedger for OfflineLedger {
	fn is_duplicate<'a>(&'a self, _id: &'a EnvelopeId) -> LedgerFuture<'a, bool> {
		self.0.fetch_add(1, Ordering::SeqCst);

		Box::pin(async { Err(LedgerError::Backend { message: "ledger offline".into() }) })
	}

	fn mark_processed<'a>(&'a self, _id: &'a EnvelopeId) -> LedgerFuture<'a, ()> {
		Box::pin(async { Err(LedgerError::Backend { message: "ledger offline".into() }) })
	}
}

#[tokio::test]
async fn signed_deliveries_are_accepted_once() {
	let verifier = WebhookVerifier::new(SECRET);
	let id = EnvelopeId::generate();
	let payload = delivery(&id, "reservation.created");
	let signature = sign(&payload, SECRET.as_bytes());
	let first = verifier.accept(&payload, &signature).await.expect("First delivery is valid.");

	assert!(!first.duplicate);
	assert_eq!(first.envelope.id, id);
	assert_eq!(first.envelope.action, "reservation.created");
	assert_eq!(first.envelope.data["guests"]["adult_count"], 2);
	assert!(first.envelope.id.timestamp().is_some());

	verifier.mark_processed(&first.envelope.id).await.expect("Memory ledger should not fail.");

	let prefixed = format!("sha256={signature}");
	let replay = verifier.accept(&payload, &prefixed).await.expect("Replay is still authentic.");

	assert!(replay.duplicate);
	assert_eq!(verifier.ledger().len(), 1);
}

#[tokio::test]
async fn tampered_or_foreign_deliveries_are_rejected() {
	let verifier = WebhookVerifier::new(SECRET);
	let id = EnvelopeId::generate();
	let payload = delivery(&id, "reservation.changed");
	let signature = sign(&payload, SECRET.as_bytes());
	let tampered = delivery(&id, "reservation.cancelled");
	let foreign = sign(&payload, b"someone-else");

	assert!(matches!(
		verifier.accept(&tampered, &signature).await,
		Err(WebhookError::InvalidSignature)
	));
	assert!(matches!(
		verifier.accept(&payload, &foreign).await,
		Err(WebhookError::InvalidSignature)
	));
	assert!(matches!(verifier.accept(&payload, "").await, Err(WebhookError::InvalidSignature)));
	assert!(verifier.ledger().is_empty());
}

#[tokio::test]
async fn authentic_but_malformed_bodies_report_the_field() {
	let verifier = WebhookVerifier::new(SECRET);
	let payload = serde_json::to_vec(&json!({
		"id": "01JRQ0000000000000000000AB",
		"action": "message.created",
		"created": 1_744_450_200
	}))
	.expect("Body fixture should serialize.");
	let signature = sign(&payload, SECRET.as_bytes());

	match verifier.accept(&payload, &signature).await {
		Err(WebhookError::Envelope(err)) => assert_eq!(err.path().to_string(), "created"),
		other => panic!("Unexpected result: {other:?}."),
	}
}

#[tokio::test]
async fn ledger_failures_surface_after_a_valid_signature() {
	let ledger = Arc::new(OfflineLedger(AtomicUsize::new(0)));
	let verifier = WebhookVerifier::with_ledger(SECRET, ledger.clone());
	let payload = delivery(&EnvelopeId::generate(), "property.changed");
	let signature = sign(&payload, SECRET.as_bytes());
	let err = verifier.accept(&payload, &signature).await.expect_err("Ledger outage must surface.");

	assert!(matches!(err, WebhookError::Ledger(LedgerError::Backend { .. })));
	assert_eq!(ledger.0.load(Ordering::SeqCst), 1);
	assert!(matches!(verifier.accept(&payload, "00").await, Err(WebhookError::InvalidSignature)));
	assert_eq!(ledger.0.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn verifiers_share_one_ledger_across_tasks() {
	let ledger = Arc::new(MemoryLedger::new());
	let id = EnvelopeId::generate();
	let payload = Arc::new(delivery(&id, "reservation.created"));
	let signature = sign(&payload, SECRET.as_bytes());
	let handles: Vec<_> = (0..4)
		.map(|_| {
			let verifier = WebhookVerifier::with_ledger(SECRET, ledger.clone());
			let payload = payload.clone();
			let signature = signature.clone();

			tokio::spawn(async move {
				verifier.accept(&payload, &signature).await.expect("Delivery should verify.")
			})
		})
		.collect();

	for handle in handles {
		assert!(!handle.await.expect("Verifier task should finish.").duplicate);
	}

	let verifier = WebhookVerifier::with_ledger(SECRET, ledger.clone());

	verifier.mark_processed(&id).await.expect("Memory ledger should not fail.");

	assert!(verifier.accept(&payload, &signature).await.expect("Replay verifies.").duplicate);
	assert!(verifier.is_duplicate(&id).await.expect("Memory ledger should not fail."));
}
