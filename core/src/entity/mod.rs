//! # Entities — Wallets, Principals, Cards
//!
//! The semantic containers the transactional layers operate on. Nothing in
//! this module moves money: wallets are spending envelopes whose balances
//! live in the ledger, principals are the owners of wallets, and virtual
//! cards are payment identities layered on top of wallets.

pub mod card;
pub mod principal;
pub mod wallet;

pub use card::{CardError, CardStatus, VirtualCard};
pub use principal::{Agent, Merchant, PrincipalError, PrincipalRegistry};
pub use wallet::{Wallet, WalletError, WalletRegistry};
