use crate::models::{Direction, Transfer};

/// Outcome of FIFO matching within one token.
#[derive(Debug, Clone, Default)]
pub struct FifoMatch {
    /// `(buy, sell)` round trips in sell order.
    pub round_trips: Vec<(Transfer, Transfer)>,
    /// Buys never consumed by a sell, in time order.
    pub open_buys: Vec<Transfer>,
    /// Sells with no earlier unconsumed buy.
    pub unmatched_sells: usize,
}

/// Match every sell to the earliest unconsumed buy with a strictly earlier
/// timestamp.
///
/// Transfers of a single token are expected; they are re-sorted by timestamp
/// (stable) before matching. Amounts are not reconciled: one buy covers one
/// sell.
pub fn match_fifo(transfers: &[Transfer]) -> FifoMatch {
    let mut ordered: Vec<&Transfer> = transfers.iter().collect();
    ordered.sort_by_key(|t| t.timestamp);

    let buys: Vec<&Transfer> = ordered
        .iter()
        .copied()
        .filter(|t| t.direction == Direction::Buy)
        .collect();

    let mut result = FifoMatch::default();
    // Matches always take the earliest open buy, so consumed buys form a prefix.
    let mut next_open = 0usize;

    for sell in ordered.iter().filter(|t| t.direction == Direction::Sell) {
        match buys.get(next_open) {
            Some(buy) if buy.timestamp < sell.timestamp => {
                result.round_trips.push(((*buy).clone(), (*sell).clone()));
                next_open += 1;
            }
            _ => {
                tracing::debug!(hash = %sell.hash, token = %sell.token.address, "Sell without an earlier buy, ignored");
                result.unmatched_sells += 1;
            }
        }
    }

    result.open_buys = buys[next_open..].iter().map(|b| (*b).clone()).collect();
    result
}
