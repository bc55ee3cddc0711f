pub mod chain;
pub mod history;
pub mod ledger;
pub mod numbering;
pub mod service;
