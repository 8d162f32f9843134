//! Lazy cursor pagination.
//!
//! APIs that return large collections in pages (Horizon's `cursor`, continuation tokens)
//! are walked through [`paginate`], a finite stream that asks for the next page only
//! after the previous one has been consumed. A walk always starts from the beginning;
//! there is no way to resume a half-consumed stream.

use futures::{stream, Stream, TryStreamExt};
use std::future::Future;

/// One page of a paginated collection
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
	/// Records on this page, in server order
	pub records: Vec<T>,
	/// Cursor of the next page, `None` when the server signalled the end
	pub next: Option<String>,
}

impl<T> Page<T> {
	pub fn last(records: Vec<T>) -> Self {
		Self {
			records,
			next: None,
		}
	}
}

enum Cursor {
	Start,
	Next(String),
	Done,
}

/// Walks a paginated collection page by page.
///
/// `fetch` receives `None` for the first page and the server-provided cursor afterwards.
/// The stream ends after a page without a next cursor, or after an empty page.
pub fn paginate<T, E, F, Fut>(fetch: F) -> impl Stream<Item = Result<Vec<T>, E>>
where
	F: Fn(Option<String>) -> Fut,
	Fut: Future<Output = Result<Page<T>, E>>,
{
	stream::try_unfold((Cursor::Start, fetch), |(cursor, fetch)| async move {
		let token = match cursor {
			Cursor::Start => None,
			Cursor::Next(token) => Some(token),
			Cursor::Done => return Ok(None),
		};
		let page = match fetch(token).await {
			Ok(page) => page,
			Err(e) => return Err(e),
		};
		if page.records.is_empty() {
			return Ok(None);
		}
		let next = match page.next {
			Some(token) => Cursor::Next(token),
			None => Cursor::Done,
		};
		Ok(Some((page.records, (next, fetch))))
	})
}

/// Drains a paginated collection into a single vector.
pub async fn collect_all<T, E, F, Fut>(fetch: F) -> Result<Vec<T>, E>
where
	F: Fn(Option<String>) -> Fut,
	Fut: Future<Output = Result<Page<T>, E>>,
{
	let pages: Vec<Vec<T>> = paginate(fetch).try_collect().await?;
	Ok(pages.into_iter().flatten().collect())
}
