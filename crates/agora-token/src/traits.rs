use uuid::Uuid;

use agora_types::{Amount, Result};

/// The settlement-token ledger the escrow core settles against.
///
/// The escrow treats this as a trusted value-transfer primitive with
/// exactly-once debit/credit semantics per call: a call either moves the
/// full amount or fails without moving anything.
pub trait TokenLedger: Send + Sync {
    /// Pull funds from `payer` into `recipient`, spending `spender`'s
    /// allowance. Fails upstream if the payer never approved the spender
    /// for at least `amount`.
    fn transfer_from(
        &self,
        spender: Uuid,
        payer: Uuid,
        recipient: Uuid,
        amount: Amount,
    ) -> Result<()>;

    /// Push funds from `payer` to `recipient`.
    fn transfer(&self, payer: Uuid, recipient: Uuid, amount: Amount) -> Result<()>;

    fn balance_of(&self, account: Uuid) -> Amount;

    /// Authorize `spender` to pull up to `amount` from `owner`.
    fn approve(&self, owner: Uuid, spender: Uuid, amount: Amount);

    fn allowance(&self, owner: Uuid, spender: Uuid) -> Amount;
}
