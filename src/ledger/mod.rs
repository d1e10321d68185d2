pub mod clarity;
pub mod gateway;
pub mod models;

pub use gateway::{ContractCall, ContractRef, LedgerGateway, StacksGateway, TxId};
