pub mod dispatch;
pub mod lifecycle;
pub mod payments;
pub mod withdrawals;
