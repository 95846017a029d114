//! Peer accounting ledger
//!
//! Tracks a signed balance per peer: positive means the peer owes us,
//! negative means we owe the peer. Outgoing debt is pre-committed with
//! `reserve` and rolled back with `release`; `add` commits a change and
//! persists it before acknowledging. Balances load lazily from the state
//! store and are cached for the ledger's lifetime.

use crate::error::{NodeError, Result};
use drift_store::{Address, StateStore};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Static thresholds governing a peer relationship
#[derive(Clone, Copy, Debug)]
pub struct AccountingOptions {
    /// Debt magnitude at which a settlement is requested
    pub payment_threshold: u64,
    /// Debt magnitude beyond which we refuse further service
    pub disconnect_threshold: u64,
}

struct PeerBalance {
    balance: i64,
    reserved: u64,
}

/// The per-peer balance ledger
pub struct Accounting {
    options: AccountingOptions,
    store: Arc<dyn StateStore>,
    balances: Mutex<HashMap<Address, PeerBalance>>,
}

fn balance_key(peer: &Address) -> String {
    format!("accounting_{}", peer.to_hex())
}

impl Accounting {
    /// Create a ledger over the given state store
    pub fn new(options: AccountingOptions, store: Arc<dyn StateStore>) -> Self {
        Self {
            options,
            store,
            balances: Mutex::new(HashMap::new()),
        }
    }

    /// Pre-commit an outgoing debt of `amount` toward `peer`.
    ///
    /// Fails with `Overdraw` when the reservation would push the peer's
    /// expected balance past the disconnect threshold.
    pub async fn reserve(&self, peer: &Address, amount: u64) -> Result<()> {
        let mut balances = self.balances.lock().await;
        let entry = self.loaded(&mut balances, peer).await?;
        let expected = entry.balance - entry.reserved as i64 - amount as i64;
        if expected < -(self.options.disconnect_threshold as i64) {
            return Err(NodeError::Overdraw {
                peer: peer.clone(),
                threshold: self.options.disconnect_threshold,
            });
        }
        entry.reserved += amount;
        Ok(())
    }

    /// Roll back a reservation that was not committed
    pub async fn release(&self, peer: &Address, amount: u64) {
        let mut balances = self.balances.lock().await;
        if let Some(entry) = balances.get_mut(peer) {
            entry.reserved = entry.reserved.saturating_sub(amount);
        }
    }

    /// Commit a signed balance change; flushed to the state store before
    /// this returns.
    pub async fn add(&self, peer: &Address, delta: i64) -> Result<()> {
        let mut balances = self.balances.lock().await;
        let entry = self.loaded(&mut balances, peer).await?;
        let next = entry.balance + delta;
        self.store
            .put(&balance_key(peer), next.to_le_bytes().to_vec())
            .await?;
        entry.balance = next;

        if next.unsigned_abs() >= self.options.payment_threshold {
            // Settlement lives in a higher layer; the ledger only signals.
            debug!(peer = %peer, balance = next, "payment threshold reached");
        }
        Ok(())
    }

    /// Current balance for `peer`, loading it on first access
    pub async fn balance(&self, peer: &Address) -> Result<i64> {
        let mut balances = self.balances.lock().await;
        let entry = self.loaded(&mut balances, peer).await?;
        Ok(entry.balance)
    }

    async fn loaded<'a>(
        &self,
        balances: &'a mut HashMap<Address, PeerBalance>,
        peer: &Address,
    ) -> Result<&'a mut PeerBalance> {
        if !balances.contains_key(peer) {
            let balance = match self.store.get(&balance_key(peer)).await? {
                Some(bytes) => i64::from_le_bytes(
                    bytes
                        .try_into()
                        .map_err(|_| NodeError::MalformedBalance(peer.clone()))?,
                ),
                None => 0,
            };
            balances.insert(peer.clone(), PeerBalance { balance, reserved: 0 });
        }
        Ok(balances.get_mut(peer).expect("entry just ensured"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drift_store::MemoryStateStore;

    const DISCONNECT_THRESHOLD: u64 = 10_000;
    const PAYMENT_THRESHOLD: u64 = 1_000;

    fn ledger(store: Arc<dyn StateStore>) -> Accounting {
        Accounting::new(
            AccountingOptions {
                payment_threshold: PAYMENT_THRESHOLD,
                disconnect_threshold: DISCONNECT_THRESHOLD,
            },
            store,
        )
    }

    struct Booking {
        peer: &'static str,
        price: i64,
        expected_balance: i64,
    }

    #[tokio::test]
    async fn bookings_accumulate_per_peer() {
        let store = Arc::new(MemoryStateStore::new());
        let acc = ledger(store);

        let bookings = [
            Booking { peer: "00112233", price: 100, expected_balance: 100 },
            Booking { peer: "00112244", price: 200, expected_balance: 200 },
            Booking { peer: "00112233", price: 300, expected_balance: 400 },
            Booking { peer: "00112233", price: -100, expected_balance: 300 },
            Booking { peer: "00112244", price: -1000, expected_balance: -800 },
        ];

        for (i, booking) in bookings.iter().enumerate() {
            let peer = Address::from_hex(booking.peer).unwrap();
            if booking.price < 0 {
                acc.reserve(&peer, booking.price.unsigned_abs())
                    .await
                    .unwrap();
            }
            acc.add(&peer, booking.price).await.unwrap();
            let balance = acc.balance(&peer).await.unwrap();
            assert_eq!(
                balance, booking.expected_balance,
                "balance for peer {} not as expected after booking {}",
                booking.peer, i
            );
            if booking.price < 0 {
                acc.release(&peer, booking.price.unsigned_abs()).await;
            }
        }
    }

    #[tokio::test]
    async fn balances_survive_reconstruction() {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
        let peer1 = Address::from_hex("00112233").unwrap();
        let peer2 = Address::from_hex("00112244").unwrap();

        let acc = ledger(Arc::clone(&store));
        acc.add(&peer1, 10).await.unwrap();
        acc.add(&peer2, 20).await.unwrap();
        drop(acc);

        let acc = ledger(store);
        assert_eq!(acc.balance(&peer1).await.unwrap(), 10);
        assert_eq!(acc.balance(&peer2).await.unwrap(), 20);
    }

    #[tokio::test]
    async fn overdraw_is_refused() {
        let store = Arc::new(MemoryStateStore::new());
        let acc = ledger(store);
        let peer = Address::from_hex("aa").unwrap();

        // Right at the limit is still allowed.
        acc.reserve(&peer, DISCONNECT_THRESHOLD).await.unwrap();
        // One more unit on top crosses it.
        assert!(matches!(
            acc.reserve(&peer, 1).await,
            Err(NodeError::Overdraw { .. })
        ));

        // After release the headroom is back.
        acc.release(&peer, DISCONNECT_THRESHOLD).await;
        acc.reserve(&peer, 1).await.unwrap();
    }

    #[tokio::test]
    async fn reservations_stack_until_released() {
        let store = Arc::new(MemoryStateStore::new());
        let acc = ledger(store);
        let peer = Address::from_hex("bb").unwrap();

        acc.reserve(&peer, 6_000).await.unwrap();
        assert!(acc.reserve(&peer, 6_000).await.is_err());
        acc.release(&peer, 6_000).await;
        acc.reserve(&peer, 6_000).await.unwrap();
    }

    #[tokio::test]
    async fn credit_raises_the_overdraw_ceiling() {
        let store = Arc::new(MemoryStateStore::new());
        let acc = ledger(store);
        let peer = Address::from_hex("cc").unwrap();

        acc.add(&peer, 500).await.unwrap();
        // balance 500 allows a reservation of threshold + 500.
        acc.reserve(&peer, DISCONNECT_THRESHOLD + 500).await.unwrap();
        assert!(acc.reserve(&peer, 1).await.is_err());
    }
}
