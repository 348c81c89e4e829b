use serde::{Deserialize, Serialize};

/// Master order/position side, including pending order kinds (`spec.md` §3).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
    BuyLimit,
    SellLimit,
    BuyStop,
    SellStop,
}

impl OrderSide {
    pub fn is_position(self) -> bool {
        matches!(self, OrderSide::Buy | OrderSide::Sell)
    }

    pub fn is_pending(self) -> bool {
        !self.is_position()
    }

    pub fn is_buy_family(self) -> bool {
        matches!(self, OrderSide::Buy | OrderSide::BuyLimit | OrderSide::BuyStop)
    }

    /// Opposite side, used by the Mirror Engine's close sweep to send a market order that
    /// flattens an open position (`spec.md` §4.C step 2).
    pub fn opposite_position_side(self) -> OrderSide {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
            other => other,
        }
    }

    /// Reverse-mode side mapping from `spec.md` §4.C "Open sweep": returns `None` when the
    /// mapping is undefined, in which case the ticket is skipped.
    pub fn reverse_mapped(self) -> Option<OrderSide> {
        match self {
            OrderSide::Buy => Some(OrderSide::Sell),
            OrderSide::Sell => Some(OrderSide::Buy),
            OrderSide::BuyLimit => Some(OrderSide::SellStop),
            OrderSide::SellLimit => Some(OrderSide::BuyStop),
            OrderSide::BuyStop => Some(OrderSide::SellLimit),
            OrderSide::SellStop => Some(OrderSide::BuyLimit),
        }
    }
}

/// A row in a cycle snapshot of a master's open positions plus pending orders (`spec.md` §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterTrade {
    pub ticket: i64,
    pub symbol: String,
    pub side: OrderSide,
    pub volume: f64,
    pub price_open: f64,
    pub sl: f64,
    pub tp: f64,
    pub magic: i64,
}

/// A follower's own position/pending row, plus the fields needed to recover master correlation
/// (`spec.md` §3). `symbol` is intentionally excluded from equality/epsilon comparisons done by
/// callers — those compare `sl`/`tp` only per `spec.md` §8 invariant 2.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowerTrade {
    pub ticket: i64,
    pub symbol: String,
    pub side: OrderSide,
    pub volume: f64,
    pub price_open: f64,
    pub sl: f64,
    pub tp: f64,
    pub magic: i64,
    pub profit: f64,
    pub comment: String,
}

impl FollowerTrade {
    /// A follower trade is a mirror of master ticket `T` iff its magic matches the follower's
    /// configured magic and its comment is `"F <T>"` (`spec.md` §3, §6 "Comment encoding").
    /// This is the sole cross-account correlation mechanism — there is no persistent database.
    pub fn mirrored_master_ticket(&self, follower_magic: i64) -> Option<i64> {
        if self.magic != follower_magic {
            return None;
        }

        let rest = self.comment.strip_prefix("F ")?;
        rest.trim().parse::<i64>().ok()
    }
}

pub fn mirror_open_comment(master_ticket: i64) -> String {
    format!("F {master_ticket}")
}

pub fn mirror_close_comment(master_ticket: i64) -> String {
    format!("Close F {master_ticket}")
}
