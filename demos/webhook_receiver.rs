//! Demonstrates verifying webhook deliveries and skipping replays of an already handled envelope.

// crates.io
use color_eyre::Result;
use serde_json::json;
// self
use hospitable_client::webhook::{EnvelopeId, SIGNATURE_HEADER, WebhookVerifier, sign};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let secret = "whsec_demo";
	let verifier = WebhookVerifier::new(secret);
	let payload = serde_json::to_vec(&json!({
		"id": EnvelopeId::generate(),
		"action": "reservation.created",
		"data": { "id": "res-7", "arrival_date": "2025-07-04", "nights": 3 },
		"created": "2025-06-01T10:15:00Z",
		"version": "v2"
	}))?;
	// What the platform would send in the signature header.
	let signature = sign(&payload, secret.as_bytes());

	println!("{SIGNATURE_HEADER}: {signature}");

	for attempt in 1..=2 {
		let delivery = verifier.accept(&payload, &signature).await?;

		if delivery.duplicate {
			println!("Attempt {attempt}: envelope {} already handled.", delivery.envelope.id);

			continue;
		}

		println!(
			"Attempt {attempt}: handling {} for {}.",
			delivery.envelope.action, delivery.envelope.data["id"]
		);
		verifier.mark_processed(&delivery.envelope.id).await?;
	}

	match verifier.accept(b"{\"id\":\"forged\"}", &signature).await {
		Ok(_) => println!("Forged delivery was accepted."),
		Err(err) => println!("Forged delivery rejected: {err}"),
	}

	Ok(())
}
