// ===============================
// src/positions.rs (position rounds & account snapshots)
// ===============================

use ahash::AHashMap as HashMap;
use tracing::debug;

use crate::domain::{AccountSnapshot, ContractReference, Direction, PositionSnapshot};
use crate::metrics::{ACCOUNT_BALANCE, POSITION_VOLUME};
use crate::venue::{InvestorPositionField, TradingAccountField};

/// Accumulates the fragments of one position query round.
#[derive(Debug, Default)]
pub struct PositionAggregator {
    positions: HashMap<(String, Direction), PositionSnapshot>,
}

impl PositionAggregator {
    pub fn new() -> Self { Self::default() }

    pub fn on_fragment(&mut self, frag: &InvestorPositionField, direction: Direction, contract: &ContractReference) {
        let key = (frag.instrument_id.clone(), direction);
        let position = self.positions.entry(key).or_insert_with(|| PositionSnapshot {
            symbol: frag.instrument_id.clone(),
            exchange: contract.exchange,
            direction,
            volume: 0,
            frozen: 0,
            yd_volume: 0,
            price: 0.0,
            pnl: 0.0,
        });

        // SHFE/INE send yesterday and today as separate rows
        if contract.exchange.splits_yesterday() {
            if frag.yd_position != 0 && frag.today_position == 0 {
                position.yd_volume = frag.position;
            }
        } else {
            position.yd_volume = frag.position - frag.today_position;
        }

        let size = contract.size;
        let mut cost = position.price * position.volume as f64 * size;

        position.volume += frag.position;
        position.pnl += frag.position_profit;

        let denom = position.volume as f64 * size;
        if denom != 0.0 {
            cost += frag.position_cost;
            position.price = cost / denom;
        }

        // a long position is frozen by pending sell-closes and vice versa
        position.frozen += match direction {
            Direction::Long => frag.short_frozen,
            Direction::Short | Direction::Net => frag.long_frozen,
        };
    }

    /// Ends the round: returns every snapshot (ordered by symbol, side) and starts empty.
    pub fn finish_round(&mut self) -> Vec<PositionSnapshot> {
        let mut batch: Vec<PositionSnapshot> = self.positions.drain().map(|(_, p)| p).collect();
        batch.sort_by(|a, b| (&a.symbol, a.direction).cmp(&(&b.symbol, b.direction)));

        for p in &batch {
            POSITION_VOLUME
                .with_label_values(&[&p.symbol, direction_label(p.direction)])
                .set(p.volume);
        }
        debug!(positions = batch.len(), "position round complete");
        batch
    }

    pub fn is_empty(&self) -> bool { self.positions.is_empty() }
}

fn direction_label(direction: Direction) -> &'static str {
    match direction {
        Direction::Long => "long",
        Direction::Short => "short",
        Direction::Net => "net",
    }
}

/// `None` for the empty placeholder row the venue sends when there is no account.
pub fn account_snapshot(field: &TradingAccountField) -> Option<AccountSnapshot> {
    if field.account_id.is_empty() {
        return None;
    }
    ACCOUNT_BALANCE.with_label_values(&[&field.account_id]).set(field.balance);
    Some(AccountSnapshot {
        account_id: field.account_id.clone(),
        balance: field.balance,
        frozen: field.frozen_margin + field.frozen_cash + field.frozen_commission,
        available: field.available,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Exchange, Product};

    fn contract(exchange: Exchange, size: f64) -> ContractReference {
        ContractReference {
            symbol: "X".into(),
            exchange,
            name: "X".into(),
            product: Product::Futures,
            size,
            pricetick: 1.0,
            option: None,
        }
    }

    fn frag(position: i64, today: i64, yd: i64, cost: f64) -> InvestorPositionField {
        InvestorPositionField {
            instrument_id: "X".into(),
            position,
            today_position: today,
            yd_position: yd,
            position_cost: cost,
            ..Default::default()
        }
    }

    #[test]
    fn weighted_average_across_fragments() {
        let c = contract(Exchange::Dce, 10.0);
        let mut agg = PositionAggregator::new();
        agg.on_fragment(&frag(5, 5, 0, 5000.0), Direction::Long, &c);
        agg.on_fragment(&frag(3, 3, 0, 3300.0), Direction::Long, &c);

        let batch = agg.finish_round();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].volume, 8);
        assert!((batch[0].price - 103.75).abs() < 1e-9);
    }

    #[test]
    fn zero_volume_leaves_price_unchanged() {
        let c = contract(Exchange::Dce, 10.0);
        let mut agg = PositionAggregator::new();
        agg.on_fragment(&frag(0, 0, 0, 0.0), Direction::Short, &c);
        assert_eq!(agg.finish_round()[0].price, 0.0);
    }

    #[test]
    fn yesterday_volume_rules_by_exchange() {
        let mut agg = PositionAggregator::new();
        agg.on_fragment(&frag(7, 3, 4, 0.0), Direction::Long, &contract(Exchange::Dce, 1.0));
        assert_eq!(agg.finish_round()[0].yd_volume, 4);

        let shfe = contract(Exchange::Shfe, 1.0);
        agg.on_fragment(&frag(3, 3, 0, 0.0), Direction::Long, &shfe);
        agg.on_fragment(&frag(4, 0, 4, 0.0), Direction::Long, &shfe);
        let batch = agg.finish_round();
        assert_eq!(batch[0].yd_volume, 4);
        assert_eq!(batch[0].volume, 7);
    }

    #[test]
    fn frozen_comes_from_opposite_side() {
        let c = contract(Exchange::Dce, 1.0);
        let mut agg = PositionAggregator::new();
        let mut f = frag(2, 2, 0, 0.0);
        f.long_frozen = 1;
        f.short_frozen = 2;
        agg.on_fragment(&f, Direction::Long, &c);
        agg.on_fragment(&f, Direction::Short, &c);
        let batch = agg.finish_round();
        assert_eq!((batch[0].direction, batch[0].frozen), (Direction::Long, 2));
        assert_eq!((batch[1].direction, batch[1].frozen), (Direction::Short, 1));
        assert!(agg.is_empty());
    }

    #[test]
    fn empty_account_row_is_ignored() {
        assert!(account_snapshot(&TradingAccountField::default()).is_none());
        let acct = account_snapshot(&TradingAccountField {
            account_id: "8001".into(),
            balance: 1_000.0,
            frozen_margin: 10.0,
            frozen_cash: 5.0,
            frozen_commission: 1.0,
            available: 900.0,
        })
        .expect("account");
        assert_eq!(acct.frozen, 16.0);
    }
}
