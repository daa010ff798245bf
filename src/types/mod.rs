//! Type definitions for the borrow anomaly service

pub mod result;
pub mod transaction;

pub use result::{AnomalyEvent, AnomalyResult, BatchResponse, ErrorResponse, RejectedTransaction};
pub use transaction::{Borrower, BorrowTransaction, Equipment};
