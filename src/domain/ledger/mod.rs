//! Ledger module - local record of payment attempts.

mod entry;

pub use entry::{LedgerEntry, LedgerStatus, NewLedgerEntry, PaymentKind, META_PLAN_ID};
