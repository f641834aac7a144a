use std::collections::HashMap;
use std::sync::Mutex;

use uuid::Uuid;

use agora_types::{AgoraError, Amount, Result};

use crate::traits::TokenLedger;

#[derive(Debug, Default)]
struct TokenState {
    balances: HashMap<Uuid, Amount>,
    /// (owner, spender) -> remaining approved amount.
    allowances: HashMap<(Uuid, Uuid), Amount>,
}

/// In-memory settlement token with standard transfer/approve semantics.
///
/// Stands in for the external stablecoin ledger; every mutation happens
/// under one lock so a call observes and produces a consistent state.
#[derive(Debug, Default)]
pub struct InMemoryToken {
    state: Mutex<TokenState>,
}

impl InMemoryToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit fresh funds to an account. Test/deployment fixture only.
    pub fn mint(&self, account: Uuid, amount: Amount) {
        let mut state = self.state.lock().expect("token lock poisoned");
        *state.balances.entry(account).or_insert(0) += amount;
    }

    pub fn total_supply(&self) -> Amount {
        let state = self.state.lock().expect("token lock poisoned");
        state.balances.values().copied().sum()
    }
}

fn debit(state: &mut TokenState, account: Uuid, amount: Amount) -> Result<()> {
    let balance = state.balances.entry(account).or_insert(0);
    if *balance < amount {
        return Err(AgoraError::InsufficientBalance {
            needed: amount,
            available: *balance,
        });
    }
    *balance -= amount;
    Ok(())
}

fn credit(state: &mut TokenState, account: Uuid, amount: Amount) {
    *state.balances.entry(account).or_insert(0) += amount;
}

impl TokenLedger for InMemoryToken {
    fn transfer_from(
        &self,
        spender: Uuid,
        payer: Uuid,
        recipient: Uuid,
        amount: Amount,
    ) -> Result<()> {
        let mut state = self.state.lock().expect("token lock poisoned");

        let approved = state
            .allowances
            .get(&(payer, spender))
            .copied()
            .unwrap_or(0);
        if approved < amount {
            return Err(AgoraError::InsufficientAllowance {
                needed: amount,
                approved,
            });
        }

        debit(&mut state, payer, amount)?;
        credit(&mut state, recipient, amount);
        state.allowances.insert((payer, spender), approved - amount);
        Ok(())
    }

    fn transfer(&self, payer: Uuid, recipient: Uuid, amount: Amount) -> Result<()> {
        let mut state = self.state.lock().expect("token lock poisoned");
        debit(&mut state, payer, amount)?;
        credit(&mut state, recipient, amount);
        Ok(())
    }

    fn balance_of(&self, account: Uuid) -> Amount {
        let state = self.state.lock().expect("token lock poisoned");
        state.balances.get(&account).copied().unwrap_or(0)
    }

    fn approve(&self, owner: Uuid, spender: Uuid, amount: Amount) {
        let mut state = self.state.lock().expect("token lock poisoned");
        state.allowances.insert((owner, spender), amount);
    }

    fn allowance(&self, owner: Uuid, spender: Uuid) -> Amount {
        let state = self.state.lock().expect("token lock poisoned");
        state.allowances.get(&(owner, spender)).copied().unwrap_or(0)
    }
}
