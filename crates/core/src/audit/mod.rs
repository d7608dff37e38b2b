//! Audit trail records: process logs and error logs.

pub mod types;

pub use types::{
    ErrorCategory, ErrorSeverity, NewProcessLog, PaymentErrorLog, PaymentProcessLog,
    ProcessEventType,
};
