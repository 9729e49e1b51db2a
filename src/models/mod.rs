//! Data models shared by the poller, the reporting surface and the notifier

pub mod transaction;

pub use transaction::{null_as_default, AppFee, Cursor, Transaction, TransactionStatus};
