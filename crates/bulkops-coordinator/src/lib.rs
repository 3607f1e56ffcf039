//! Client-side coordination for long-running bulk actions: a bounded
//! dispatcher over a static list of work items, a progress ledger with an
//! idempotent merge for remote completion events, cooperative cancellation,
//! and a resumable page-by-page fetch loop.

pub mod cancel;
pub mod completion;
pub mod coordinator;
pub mod dispatch;
pub mod error;
pub mod ledger;
pub mod paged;
pub mod render;
pub mod session;

pub use cancel::StopToken;
pub use completion::{
    ChannelName, CompletionChannel, CompletionEvent, Correlation, EventKind, JsonLinesChannel,
};
pub use coordinator::{BulkCoordinator, BulkSummary, Preflight};
pub use dispatch::{dispatch, DispatchReport};
pub use error::{CoordinatorError, ItemFailure};
pub use ledger::{BarSegments, ItemOutcome, ProgressLedger, ProgressSnapshot, RecordResult};
pub use paged::{FetchState, Page, PageSource, PagedFetch};
pub use render::{Completion, Phase, ProgressRenderer, ProgressView, ResultRow, TracingRenderer};
pub use session::{ModalSlot, OperationContext};
