// self
use crate::{_prelude::*, webhook::EnvelopeId};

/// How long [`MemoryLedger`] remembers a processed delivery by default.
pub const DEFAULT_RETENTION: Duration = Duration::hours(24);

/// Boxed future returned by [`DeliveryLedger`] implementations.
pub type LedgerFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, LedgerError>> + 'a + Send>>;

/// Duplicate-tracking contract for webhook deliveries.
pub trait DeliveryLedger
where
	Self: Send + Sync,
{
	/// Whether `id` was already processed within the retention window.
	fn is_duplicate<'a>(&'a self, id: &'a EnvelopeId) -> LedgerFuture<'a, bool>;

	/// Records `id` as processed.
	fn mark_processed<'a>(&'a self, id: &'a EnvelopeId) -> LedgerFuture<'a, ()>;
}

/// Error type produced by [`DeliveryLedger`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum LedgerError {
	/// Backend-level failure of the ledger storage.
	#[error("Ledger backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// In-process ledger that forgets deliveries after a retention window.
#[derive(Clone, Debug)]
pub struct MemoryLedger {
	seen: Arc<Mutex<HashMap<EnvelopeId, OffsetDateTime>>>,
	retention: Duration,
}
impl MemoryLedger {
	/// Ledger with the default 24-hour retention.
	pub fn new() -> Self {
		Self::with_retention(DEFAULT_RETENTION)
	}

	/// Ledger remembering deliveries for `retention`.
	pub fn with_retention(retention: Duration) -> Self {
		Self { seen: Default::default(), retention }
	}

	/// Retention window in effect.
	pub fn retention(&self) -> Duration {
		self.retention
	}

	/// Number of deliveries currently remembered.
	pub fn len(&self) -> usize {
		self.seen.lock().len()
	}

	/// Whether no delivery is remembered.
	pub fn is_empty(&self) -> bool {
		self.seen.lock().is_empty()
	}

	/// [`DeliveryLedger::is_duplicate`] evaluated at `now`.
	pub fn is_duplicate_at(&self, id: &EnvelopeId, now: OffsetDateTime) -> bool {
		let mut seen = self.seen.lock();

		Self::prune(&mut seen, now, self.retention);

		seen.contains_key(id)
	}

	/// [`DeliveryLedger::mark_processed`] evaluated at `now`.
	pub fn mark_processed_at(&self, id: &EnvelopeId, now: OffsetDateTime) {
		let mut seen = self.seen.lock();

		Self::prune(&mut seen, now, self.retention);
		seen.insert(id.clone(), now);
	}

	fn prune(
		seen: &mut HashMap<EnvelopeId, OffsetDateTime>,
		now: OffsetDateTime,
		retention: Duration,
	) {
		seen.retain(|_, processed_at| now - *processed_at < retention);
	}
}
impl Default for MemoryLedger {
	fn default() -> Self {
		Self::new()
	}
}
impl DeliveryLedger for MemoryLedger {
	fn is_duplicate<'a>(&'a self, id: &'a EnvelopeId) -> LedgerFuture<'a, bool> {
		let duplicate = self.is_duplicate_at(id, OffsetDateTime::now_utc());

		Box::pin(async move { Ok(duplicate) })
	}

	fn mark_processed<'a>(&'a self, id: &'a EnvelopeId) -> LedgerFuture<'a, ()> {
		self.mark_processed_at(id, OffsetDateTime::now_utc());

		Box::pin(async { Ok(()) })
	}
}
