// ===============================
// src/venue.rs
// ===============================
//
// Transport/SDK boundary:
// - raw request/response/push structs as the venue SDK hands them over
// - request traits (TraderApi / MdApi), each call returns 0 when admitted,
//   non-zero when the transport throttled or refused the submission
// - callback traits (TraderSpi / MdSpi), one method per callback kind,
//   invoked sequentially on the session's own execution context
// - code tables between venue single-char codes and domain enums
//
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};

use crate::domain::{Direction, Offset, OptionType, OrderType, Product, Status};

/// Venue codes (single ASCII chars on the wire).
pub mod codes {
    // order status
    pub const OST_ALL_TRADED: char = '0';
    pub const OST_PART_TRADED_QUEUEING: char = '1';
    pub const OST_NO_TRADE_QUEUEING: char = '3';
    pub const OST_CANCELED: char = '5';
    pub const OST_UNKNOWN: char = 'a';

    // order direction
    pub const D_BUY: char = '0';
    pub const D_SELL: char = '1';

    // position direction
    pub const PD_NET: char = '1';
    pub const PD_LONG: char = '2';
    pub const PD_SHORT: char = '3';

    // price type
    pub const OPT_ANY_PRICE: char = '1';
    pub const OPT_LIMIT_PRICE: char = '2';

    // offset
    pub const OF_OPEN: char = '0';
    pub const OF_CLOSE: char = '1';
    pub const OF_CLOSE_TODAY: char = '3';
    pub const OF_CLOSE_YESTERDAY: char = '4';

    // product class
    pub const PC_FUTURES: char = '1';
    pub const PC_OPTIONS: char = '2';
    pub const PC_COMBINATION: char = '3';
    pub const PC_SPOT_OPTION: char = '6';

    // option kind
    pub const CP_CALL: char = '1';
    pub const CP_PUT: char = '2';

    // time / volume condition
    pub const TC_IOC: char = '1';
    pub const TC_GFD: char = '3';
    pub const VC_AV: char = '1';
    pub const VC_CV: char = '3';

    // misc order fields
    pub const HF_SPECULATION: char = '1';
    pub const CC_IMMEDIATELY: char = '1';
    pub const FCC_NOT_FORCE_CLOSE: char = '0';
    pub const AF_DELETE: char = '0';
    pub const BZTP_FUTURE: char = '1';

    /// Authentication rejected because the auth code itself is invalid.
    pub const ERR_INVALID_AUTH_CODE: i32 = 63;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RspInfo { pub error_id: i32, pub error_msg: String }

impl RspInfo {
    pub fn ok() -> Self { Self::default() }
    pub fn error(error_id: i32, msg: impl Into<String>) -> Self {
        Self { error_id, error_msg: msg.into() }
    }
    pub fn is_ok(&self) -> bool { self.error_id == 0 }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReqAuthenticate { pub broker_id: String, pub user_id: String, pub auth_code: String, pub app_id: String }

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReqUserLogin { pub broker_id: String, pub user_id: String, pub password: String }

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RspUserLogin { pub front_id: i32, pub session_id: i32, pub trading_day: String }

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettlementInfoConfirm { pub broker_id: String, pub investor_id: String }

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QryInvestorPosition { pub broker_id: String, pub investor_id: String }

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QryTradingAccount { pub biz_type: char }

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputOrderField {
    pub instrument_id: String,
    pub exchange_id: String,
    pub order_ref: String,
    pub investor_id: String,
    pub user_id: String,
    pub broker_id: String,
    pub limit_price: f64,
    pub volume_total_original: i64,
    pub order_price_type: char,
    pub direction: char,
    pub comb_offset_flag: char,
    pub comb_hedge_flag: char,
    pub contingent_condition: char,
    pub force_close_reason: char,
    pub is_auto_suspend: bool,
    pub time_condition: char,
    pub volume_condition: char,
    pub min_volume: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputOrderActionField {
    pub instrument_id: String,
    pub exchange_id: String,
    pub order_ref: String,
    pub front_id: i32,
    pub session_id: i32,
    pub action_flag: char,
    pub broker_id: String,
    pub investor_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderField {
    pub instrument_id: String,
    pub exchange_id: String,
    pub front_id: i32,
    pub session_id: i32,
    pub order_ref: String,
    pub order_sys_id: String,
    pub order_price_type: char,
    pub time_condition: char,
    pub volume_condition: char,
    pub direction: char,
    pub comb_offset_flag: char,
    pub limit_price: f64,
    pub volume_total_original: i64,
    pub volume_traded: i64,
    pub order_status: char,
    pub insert_date: String,
    pub insert_time: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeField {
    pub instrument_id: String,
    pub exchange_id: String,
    pub order_sys_id: String,
    pub trade_id: String,
    pub direction: char,
    pub offset_flag: char,
    pub price: f64,
    pub volume: i64,
    pub trade_date: String,
    pub trade_time: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstrumentField {
    pub instrument_id: String,
    pub exchange_id: String,
    pub instrument_name: String,
    pub product_class: char,
    pub product_id: String,
    pub volume_multiple: f64,
    pub price_tick: f64,
    pub underlying_instr_id: String,
    pub options_type: char,
    pub strike_price: f64,
    pub open_date: String,
    pub expire_date: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvestorPositionField {
    pub instrument_id: String,
    pub posi_direction: char,
    pub position: i64,
    pub today_position: i64,
    pub yd_position: i64,
    pub position_cost: f64,
    pub position_profit: f64,
    pub long_frozen: i64,
    pub short_frozen: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradingAccountField {
    pub account_id: String,
    pub balance: f64,
    pub frozen_margin: f64,
    pub frozen_cash: f64,
    pub frozen_commission: f64,
    pub available: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DepthMarketDataField {
    pub instrument_id: String,
    pub action_day: String,
    pub update_time: String,
    pub update_millisec: i32,
    pub volume: i64,
    pub turnover: f64,
    pub open_interest: f64,
    pub last_price: f64,
    pub upper_limit_price: f64,
    pub lower_limit_price: f64,
    pub open_price: f64,
    pub highest_price: f64,
    pub lowest_price: f64,
    pub pre_close_price: f64,
    pub bid_prices: [f64; 5],
    pub bid_volumes: [i64; 5],
    pub ask_prices: [f64; 5],
    pub ask_volumes: [i64; 5],
}

/// Requests of the trading front.
pub trait TraderApi {
    /// Register the front address and start the API; callbacks follow.
    fn connect(&mut self, address: &str);
    fn req_authenticate(&mut self, req: &ReqAuthenticate, request_id: i32) -> i32;
    fn req_user_login(&mut self, req: &ReqUserLogin, request_id: i32) -> i32;
    fn req_settlement_info_confirm(&mut self, req: &SettlementInfoConfirm, request_id: i32) -> i32;
    fn req_qry_instrument(&mut self, request_id: i32) -> i32;
    fn req_qry_investor_position(&mut self, req: &QryInvestorPosition, request_id: i32) -> i32;
    fn req_qry_trading_account(&mut self, req: &QryTradingAccount, request_id: i32) -> i32;
    fn req_order_insert(&mut self, req: &InputOrderField, request_id: i32) -> i32;
    fn req_order_action(&mut self, req: &InputOrderActionField, request_id: i32) -> i32;
}

/// Requests of the market-data front.
pub trait MdApi {
    fn connect(&mut self, address: &str);
    fn req_user_login(&mut self, req: &ReqUserLogin, request_id: i32) -> i32;
    fn subscribe_market_data(&mut self, symbols: &[String]) -> i32;
}

/// Callbacks of the trading front.
pub trait TraderSpi {
    fn on_front_connected(&mut self);
    fn on_front_disconnected(&mut self, reason: i32);
    fn on_rsp_authenticate(&mut self, info: &RspInfo);
    fn on_rsp_user_login(&mut self, rsp: &RspUserLogin, info: &RspInfo);
    fn on_rsp_settlement_info_confirm(&mut self, info: &RspInfo);
    fn on_rsp_order_insert(&mut self, input: &InputOrderField, info: &RspInfo);
    fn on_rsp_order_action(&mut self, input: &InputOrderActionField, info: &RspInfo);
    fn on_rsp_qry_instrument(&mut self, instrument: Option<&InstrumentField>, info: &RspInfo, is_last: bool);
    fn on_rsp_qry_investor_position(&mut self, position: Option<&InvestorPositionField>, info: &RspInfo, is_last: bool);
    fn on_rsp_qry_trading_account(&mut self, account: &TradingAccountField, info: &RspInfo);
    fn on_rtn_order(&mut self, order: &OrderField);
    fn on_rtn_trade(&mut self, trade: &TradeField);
}

/// Callbacks of the market-data front.
pub trait MdSpi {
    fn on_front_connected(&mut self);
    fn on_front_disconnected(&mut self, reason: i32);
    fn on_rsp_user_login(&mut self, rsp: &RspUserLogin, info: &RspInfo);
    fn on_rsp_error(&mut self, info: &RspInfo);
    fn on_rsp_sub_market_data(&mut self, symbol: &str, info: &RspInfo);
    fn on_rtn_depth_market_data(&mut self, data: &DepthMarketDataField);
}

// ---- Code tables ----

pub fn status_from_venue(code: char) -> Option<Status> {
    match code {
        codes::OST_NO_TRADE_QUEUEING => Some(Status::NotTraded),
        codes::OST_PART_TRADED_QUEUEING => Some(Status::PartTraded),
        codes::OST_ALL_TRADED => Some(Status::AllTraded),
        codes::OST_CANCELED => Some(Status::Cancelled),
        codes::OST_UNKNOWN => Some(Status::Submitting),
        _ => None,
    }
}

pub fn direction_to_venue(direction: Direction) -> Option<char> {
    match direction {
        Direction::Long => Some(codes::D_BUY),
        Direction::Short => Some(codes::D_SELL),
        Direction::Net => None,
    }
}

pub fn direction_from_venue(code: char) -> Option<Direction> {
    match code {
        codes::D_BUY => Some(Direction::Long),
        codes::D_SELL => Some(Direction::Short),
        _ => None,
    }
}

pub fn posi_direction_from_venue(code: char) -> Option<Direction> {
    match code {
        codes::PD_LONG => Some(Direction::Long),
        codes::PD_SHORT => Some(Direction::Short),
        codes::PD_NET => Some(Direction::Net),
        _ => None,
    }
}

/// (price type, time condition, volume condition)
pub type OrderTypeTuple = (char, char, char);

pub fn order_type_to_venue(order_type: OrderType) -> Option<OrderTypeTuple> {
    match order_type {
        OrderType::Limit => Some((codes::OPT_LIMIT_PRICE, codes::TC_GFD, codes::VC_AV)),
        OrderType::Market => Some((codes::OPT_ANY_PRICE, codes::TC_GFD, codes::VC_AV)),
        OrderType::Fak => Some((codes::OPT_LIMIT_PRICE, codes::TC_IOC, codes::VC_AV)),
        OrderType::Fok => Some((codes::OPT_LIMIT_PRICE, codes::TC_IOC, codes::VC_CV)),
        OrderType::Stop => None,
    }
}

pub fn order_type_from_venue(tuple: OrderTypeTuple) -> Option<OrderType> {
    [OrderType::Limit, OrderType::Market, OrderType::Fak, OrderType::Fok]
        .into_iter()
        .find(|t| order_type_to_venue(*t) == Some(tuple))
}

pub fn offset_to_venue(offset: Offset) -> Option<char> {
    match offset {
        Offset::Open => Some(codes::OF_OPEN),
        Offset::Close => Some(codes::OF_CLOSE),
        Offset::CloseToday => Some(codes::OF_CLOSE_TODAY),
        Offset::CloseYesterday => Some(codes::OF_CLOSE_YESTERDAY),
        Offset::None => None,
    }
}

pub fn offset_from_venue(code: char) -> Offset {
    match code {
        codes::OF_OPEN => Offset::Open,
        codes::OF_CLOSE => Offset::Close,
        codes::OF_CLOSE_TODAY => Offset::CloseToday,
        codes::OF_CLOSE_YESTERDAY => Offset::CloseYesterday,
        _ => Offset::None,
    }
}

pub fn product_from_venue(code: char) -> Option<Product> {
    match code {
        codes::PC_FUTURES => Some(Product::Futures),
        codes::PC_OPTIONS | codes::PC_SPOT_OPTION => Some(Product::Option),
        codes::PC_COMBINATION => Some(Product::Spread),
        _ => None,
    }
}

pub fn option_type_from_venue(code: char) -> Option<OptionType> {
    match code {
        codes::CP_CALL => Some(OptionType::Call),
        codes::CP_PUT => Some(OptionType::Put),
        _ => None,
    }
}

// ---- Time helpers (venue clock is UTC+08:00) ----

const VENUE_UTC_OFFSET_SECS: i32 = 8 * 3600;

pub fn venue_tz() -> Option<FixedOffset> {
    FixedOffset::east_opt(VENUE_UTC_OFFSET_SECS)
}

/// `date` as `YYYYMMDD`, `time` as `HH:MM:SS` with optional fractional part.
pub fn parse_venue_datetime(date: &str, time: &str) -> Option<DateTime<FixedOffset>> {
    let raw = format!("{date} {time}");
    let naive = NaiveDateTime::parse_from_str(&raw, "%Y%m%d %H:%M:%S%.f").ok()?;
    venue_tz()?.from_local_datetime(&naive).single()
}

pub fn parse_venue_date(date: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(date, "%Y%m%d").ok()
}

/// The venue fills empty price slots with `f64::MAX`.
pub fn adjust_price(price: f64) -> f64 {
    if price == f64::MAX { 0.0 } else { price }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use rstest::rstest;

    #[rstest]
    #[case(OrderType::Limit)]
    #[case(OrderType::Market)]
    #[case(OrderType::Fak)]
    #[case(OrderType::Fok)]
    fn supported_order_types_decode_back(#[case] order_type: OrderType) {
        let tuple = order_type_to_venue(order_type).expect("mapped");
        assert_eq!(order_type_from_venue(tuple), Some(order_type));
    }

    #[test]
    fn unknown_order_tuple_is_unsupported() {
        assert_eq!(order_type_to_venue(OrderType::Stop), None);
        assert_eq!(order_type_from_venue((codes::OPT_ANY_PRICE, codes::TC_IOC, codes::VC_CV)), None);
    }

    #[rstest]
    #[case(codes::OST_NO_TRADE_QUEUEING, Some(Status::NotTraded))]
    #[case(codes::OST_PART_TRADED_QUEUEING, Some(Status::PartTraded))]
    #[case(codes::OST_ALL_TRADED, Some(Status::AllTraded))]
    #[case(codes::OST_CANCELED, Some(Status::Cancelled))]
    #[case(codes::OST_UNKNOWN, Some(Status::Submitting))]
    #[case('9', None)]
    fn status_table(#[case] code: char, #[case] expected: Option<Status>) {
        assert_eq!(status_from_venue(code), expected);
    }

    #[test]
    fn position_direction_keeps_net_apart_from_sell() {
        assert_eq!(direction_from_venue(codes::D_SELL), Some(Direction::Short));
        assert_eq!(posi_direction_from_venue(codes::PD_NET), Some(Direction::Net));
        assert_eq!(posi_direction_from_venue(codes::PD_LONG), Some(Direction::Long));
    }

    #[test]
    fn venue_datetime_carries_plus_eight() {
        let dt = parse_venue_datetime("20240315", "09:30:01.500").expect("parsed");
        assert_eq!(dt.offset().local_minus_utc(), 8 * 3600);
        assert_eq!((dt.year(), dt.month(), dt.day()), (2024, 3, 15));
        assert_eq!(dt.nanosecond(), 500_000_000);
        assert!(parse_venue_datetime("", "09:30:01").is_none());
    }

    #[test]
    fn max_price_sentinel_is_zeroed() {
        assert_eq!(adjust_price(f64::MAX), 0.0);
        assert_eq!(adjust_price(3512.5), 3512.5);
    }
}
