//! Transaction Store Module
//!
//! Relational store of the indexed Safe data and the API's submissions.

mod database;
mod filters;
mod models;
mod queries;

pub use database::Database;
pub use filters::{IncomingTransferFilter, MultisigTransactionFilter, Ordering, PageRequest, QueryParams};
pub use models::{
    InternalTxType, NewEthereumBlock, NewEthereumTx, NewInternalTx, NewModuleTransaction,
    NewMultisigConfirmation, NewMultisigTransaction, NewSafeContract, NewSafeStatus,
    NewTokenTransfer, SafeStatus,
};
pub use queries::{
    MODULE_DEFAULT_ORDERING, MODULE_ORDERING_FIELDS, MULTISIG_DEFAULT_ORDERING,
    MULTISIG_ORDERING_FIELDS,
};
