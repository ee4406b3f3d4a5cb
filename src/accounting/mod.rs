//! Bookkeeping rules shared by every handler. Nothing in here touches the
//! database; the `store` module loads rows, calls into these functions and
//! writes the results back.

pub mod audit;
pub mod costing;
pub mod fiscal;
pub mod import;
pub mod journal;
pub mod money;
pub mod parties;
pub mod payroll;
pub mod reconciliation;
pub mod totals;
pub mod vat;
