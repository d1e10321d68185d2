pub mod board;
pub mod fetcher;
pub mod role;
pub mod timers;
pub mod tracker;
pub mod views;

pub use board::{BoardSettings, Notices, ProposalDraft, RefreshReport, TransactionBoard};
pub use role::Role;
pub use tracker::ApprovalPhase;
pub use views::{StatusBadge, View, ViewPartition};
