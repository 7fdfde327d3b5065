//! Request dispatch: the per-descriptor transaction state machine, exactly-once completion
//! tokens and the optional per-device priority work queue.
pub mod completion;
mod dispatcher;
mod io;
pub mod queue;
mod values;

pub use completion::{Completion, CompletionEvent, IoOutcome, Reprocess, Transaction, TxnState};
pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use queue::{WorkQueue, WorkQueueConfig};
