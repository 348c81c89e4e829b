//! The data model shared by every component: accounts, follower policy, trade snapshots,
//! symbol metadata and OHLC bars (`spec.md` §3).

pub mod account;
pub mod bar;
pub mod follower;
pub mod symbol;
pub mod trade;

pub use account::{Account, AccountId, AccountState, Credentials, Role};
pub use bar::Bar;
pub use follower::{FollowerConfig, SymbolRule, SymbolRuleKind, VolumeMode};
pub use symbol::{SymbolInfo, TradeMode};
pub use trade::{FollowerTrade, MasterTrade, OrderSide};
