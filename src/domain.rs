// ===============================
// src/domain.rs
// ===============================
use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Exchange { Cffex, Shfe, Czce, Dce, Ine, Gfex }

impl Exchange {
    pub fn from_venue(code: &str) -> Option<Self> {
        match code {
            "CFFEX" => Some(Exchange::Cffex),
            "SHFE" => Some(Exchange::Shfe),
            "CZCE" => Some(Exchange::Czce),
            "DCE" => Some(Exchange::Dce),
            "INE" => Some(Exchange::Ine),
            "GFEX" => Some(Exchange::Gfex),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Exchange::Cffex => "CFFEX",
            Exchange::Shfe => "SHFE",
            Exchange::Czce => "CZCE",
            Exchange::Dce => "DCE",
            Exchange::Ine => "INE",
            Exchange::Gfex => "GFEX",
        }
    }

    /// SHFE and INE report the today/yesterday position split as separate rows.
    pub fn splits_yesterday(&self) -> bool { matches!(self, Exchange::Shfe | Exchange::Ine) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Product { Futures, Option, Spread }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptionType { Call, Put }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction { Long, Short, Net }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Offset { None, Open, Close, CloseToday, CloseYesterday }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType { Limit, Market, Fak, Fok, Stop }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status { Submitting, NotTraded, PartTraded, AllTraded, Cancelled, Rejected }

impl Status {
    pub fn is_active(&self) -> bool {
        matches!(self, Status::Submitting | Status::NotTraded | Status::PartTraded)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Submitting => "submitting",
            Status::NotTraded => "not_traded",
            Status::PartTraded => "part_traded",
            Status::AllTraded => "all_traded",
            Status::Cancelled => "cancelled",
            Status::Rejected => "rejected",
        }
    }
}

/// Option-only contract attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionDetail {
    pub portfolio: String,
    pub underlying: String,
    pub option_type: Option<OptionType>,
    pub strike: f64,
    pub index: String,
    pub listed: Option<NaiveDate>,
    pub expiry: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractReference {
    pub symbol: String,
    pub exchange: Exchange,
    pub name: String,
    pub product: Product,
    pub size: f64,
    pub pricetick: f64,
    pub option: Option<OptionDetail>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub symbol: String,
    pub exchange: Exchange,
    pub order_id: String,
    pub order_type: OrderType,
    pub direction: Direction,
    pub offset: Offset,
    pub price: f64,
    pub volume: i64,
    pub traded: i64,
    pub status: Status,
    pub datetime: Option<DateTime<FixedOffset>>,
}

impl OrderRecord {
    pub fn is_active(&self) -> bool { self.status.is_active() }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub symbol: String,
    pub exchange: Exchange,
    /// `None` when the venue system id was never bound to a local order.
    pub order_id: Option<String>,
    pub trade_id: String,
    pub direction: Direction,
    pub offset: Offset,
    pub price: f64,
    pub volume: i64,
    pub datetime: Option<DateTime<FixedOffset>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub symbol: String,
    pub exchange: Exchange,
    pub direction: Direction,
    pub volume: i64,
    pub frozen: i64,
    pub yd_volume: i64,
    pub price: f64,
    pub pnl: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub account_id: String,
    pub balance: f64,
    pub frozen: f64,
    pub available: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickSnapshot {
    pub symbol: String,
    pub exchange: Exchange,
    pub name: String,
    pub datetime: Option<DateTime<FixedOffset>>,
    pub volume: i64,
    pub turnover: f64,
    pub open_interest: f64,
    pub last_price: f64,
    pub limit_up: f64,
    pub limit_down: f64,
    pub open_price: f64,
    pub high_price: f64,
    pub low_price: f64,
    pub pre_close: f64,
    pub bid_prices: [f64; 5],
    pub bid_volumes: [i64; 5],
    pub ask_prices: [f64; 5],
    pub ask_volumes: [i64; 5],
}

/// Human-readable notification; `code` is the venue error id when there is one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogNote { pub code: Option<i32>, pub message: String }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    Contract(ContractReference),
    Order(OrderRecord),
    Trade(TradeRecord),
    Positions(Vec<PositionSnapshot>),
    Account(AccountSnapshot),
    Tick(TickSnapshot),
    Log(LogNote),
}

// ---- Requests from the consumer ----
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub exchange: Exchange,
    pub direction: Direction,
    pub offset: Offset,
    pub order_type: OrderType,
    pub price: f64,
    pub volume: i64,
}

impl OrderRequest {
    /// Local view of the order right after submission was accepted by the transport.
    pub fn create_order_data(&self, order_id: String) -> OrderRecord {
        OrderRecord {
            symbol: self.symbol.clone(),
            exchange: self.exchange,
            order_id,
            order_type: self.order_type,
            direction: self.direction,
            offset: self.offset,
            price: self.price,
            volume: self.volume,
            traded: 0,
            status: Status::Submitting,
            datetime: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelRequest { pub order_id: String, pub symbol: String, pub exchange: Exchange }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscribeRequest { pub symbol: String, pub exchange: Exchange }
