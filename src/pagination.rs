//! Lazy, restartable iteration over paginated list endpoints.
//!
//! [`Paginator::pages`] re-sends a template [`Operation`] with `page` and `per_page` rewritten from
//! a fresh [`PageCursor`]. Iteration stops after the last page the server reports, on the first
//! empty page, or on the first error; batches yielded before an error stay valid.

// std
use std::marker::PhantomData;
// crates.io
use futures::{Stream, TryStreamExt, stream};
// self
use crate::{
	_prelude::*,
	dispatch::{DEFAULT_PAGE_SIZE, Dispatcher, Operation, RequestControl},
	http::ApiHttpClient,
	oauth::TransportErrorMapper,
	obs::{self, OpKind, OpOutcome, OpSpan},
	response::{PageEnvelope, PageMeta},
};

/// Position of a page iteration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageCursor {
	/// Page requested next (1-based).
	pub page: u32,
	/// Page size sent with every request.
	pub per_page: u32,
	/// Last page reported by the server; unknown until the first response.
	pub last_page: Option<u32>,
}
impl PageCursor {
	/// Starts at page 1 with the template's `per_page` (default 10) clamped to its maximum.
	pub fn start(template: &Operation) -> Self {
		let requested = template
			.query_value("per_page")
			.and_then(|value| value.parse::<u32>().ok())
			.unwrap_or(DEFAULT_PAGE_SIZE);

		Self { page: 1, per_page: requested.clamp(1, template.max_page_size()), last_page: None }
	}

	/// Whether the cursor has moved past the last reported page.
	pub fn is_exhausted(&self) -> bool {
		self.last_page.is_some_and(|last| self.page > last)
	}

	/// The request for the current page.
	pub fn request(&self, template: &Operation) -> Operation {
		template.clone().with_page(self.page).with_per_page(self.per_page)
	}

	// Without `last_page`, a short page marks the end.
	fn advance(&mut self, meta: &PageMeta, received: usize) {
		self.last_page = match meta.last_page {
			Some(last) => Some(last),
			None if received < self.per_page as usize => Some(self.page),
			None => None,
		};
		self.page = self.page.saturating_add(1);
	}
}

/// Drives paginated endpoints through a [`Dispatcher`].
pub struct Paginator<C, M>
where
	C: ?Sized + ApiHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	dispatcher: Dispatcher<C, M>,
	control: RequestControl,
}
impl<C, M> Paginator<C, M>
where
	C: ?Sized + ApiHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a paginator sending every page through `dispatcher`.
	pub fn new(dispatcher: Dispatcher<C, M>) -> Self {
		Self { dispatcher, control: RequestControl::default() }
	}

	/// Applies `control` to every page request.
	pub fn with_control(mut self, control: RequestControl) -> Self {
		self.control = control;

		self
	}

	/// Starts a fresh page iteration over `template`.
	pub fn pages<T>(&self, template: Operation) -> Pages<C, M, T>
	where
		T: DeserializeOwned,
	{
		Pages {
			dispatcher: self.dispatcher.clone(),
			control: self.control.clone(),
			cursor: PageCursor::start(&template),
			template,
			done: false,
			_item: PhantomData,
		}
	}

	/// Starts a fresh iteration over the individual items of `template`, in server order.
	pub fn items<T>(&self, template: Operation) -> impl Stream<Item = Result<T>> + use<C, M, T>
	where
		T: DeserializeOwned,
	{
		self.pages(template)
			.into_stream()
			.map_ok(|batch| stream::iter(batch.into_iter().map(Ok::<T, Error>)))
			.try_flatten()
	}
}
impl<C, M> Clone for Paginator<C, M>
where
	C: ?Sized + ApiHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn clone(&self) -> Self {
		Self { dispatcher: self.dispatcher.clone(), control: self.control.clone() }
	}
}
impl<C, M> Debug for Paginator<C, M>
where
	C: ?Sized + ApiHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Paginator").field("dispatcher", &self.dispatcher).finish_non_exhaustive()
	}
}

/// One page iteration; obtained from [`Paginator::pages`].
pub struct Pages<C, M, T>
where
	C: ?Sized + ApiHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	dispatcher: Dispatcher<C, M>,
	control: RequestControl,
	template: Operation,
	cursor: PageCursor,
	done: bool,
	_item: PhantomData<fn() -> T>,
}
impl<C, M, T> Pages<C, M, T>
where
	C: ?Sized + ApiHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
	T: DeserializeOwned,
{
	/// Current cursor position.
	pub fn cursor(&self) -> &PageCursor {
		&self.cursor
	}

	/// Whether iteration has finished (exhausted or failed).
	pub fn is_done(&self) -> bool {
		self.done
	}

	/// Fetches the next non-empty page; `None` once iteration has finished.
	pub async fn next_page(&mut self) -> Result<Option<PageEnvelope<T>>> {
		if self.done || self.cursor.is_exhausted() {
			self.done = true;

			return Ok(None);
		}

		const KIND: OpKind = OpKind::Paginate;

		let span = OpSpan::new(KIND, "next_page");
		let request = self.cursor.request(&self.template);

		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let fetched = span
			.instrument(async {
				let response = self.dispatcher.send_with(&request, &self.control).await?;

				response.json::<PageEnvelope<T>>()
			})
			.await;
		let envelope = match fetched {
			Ok(envelope) => envelope,
			Err(err) => {
				self.done = true;

				obs::record(KIND, OpOutcome::Failure, &err);

				return Err(err);
			},
		};

		if envelope.data.is_empty() {
			self.done = true;

			obs::record_op_outcome(KIND, OpOutcome::Success);

			return Ok(None);
		}

		self.cursor.advance(&envelope.meta, envelope.data.len());
		self.done = self.cursor.is_exhausted();

		obs::record_op_outcome(KIND, OpOutcome::Success);

		Ok(Some(envelope))
	}

	/// Converts the iteration into a stream of item batches.
	pub fn into_stream(self) -> impl Stream<Item = Result<Vec<T>>> {
		stream::try_unfold(self, |mut pages| async move {
			Ok::<_, Error>(pages.next_page().await?.map(|envelope| (envelope.data, pages)))
		})
	}
}
impl<C, M, T> Debug for Pages<C, M, T>
where
	C: ?Sized + ApiHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Pages")
			.field("path", &self.template.path)
			.field("cursor", &self.cursor)
			.field("done", &self.done)
			.finish()
	}
}
