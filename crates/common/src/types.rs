use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Venue / instrument-class partition used to route feed subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExchangeSegment {
    NseCash,
    NseFo,
    BseCash,
    BseFo,
    McxFo,
    NcdexFo,
    CdsFo,
}

impl ExchangeSegment {
    /// Numeric exchangeType code used by the streaming transport's
    /// subscribe frame.
    pub fn wire_code(&self) -> u8 {
        match self {
            ExchangeSegment::NseCash => 1,
            ExchangeSegment::NseFo => 2,
            ExchangeSegment::BseCash => 3,
            ExchangeSegment::BseFo => 4,
            ExchangeSegment::McxFo => 5,
            ExchangeSegment::NcdexFo => 7,
            ExchangeSegment::CdsFo => 13,
        }
    }

    /// The `exch_seg` code used by the instrument master and the candle API.
    pub fn master_code(&self) -> &'static str {
        match self {
            ExchangeSegment::NseCash => "NSE",
            ExchangeSegment::NseFo => "NFO",
            ExchangeSegment::BseCash => "BSE",
            ExchangeSegment::BseFo => "BFO",
            ExchangeSegment::McxFo => "MCX",
            ExchangeSegment::NcdexFo => "NCDEX",
            ExchangeSegment::CdsFo => "CDS",
        }
    }

    /// Parse the `exch_seg` field of the instrument master.
    pub fn from_master_code(code: &str) -> Option<Self> {
        match code {
            "NSE" => Some(ExchangeSegment::NseCash),
            "NFO" => Some(ExchangeSegment::NseFo),
            "BSE" => Some(ExchangeSegment::BseCash),
            "BFO" => Some(ExchangeSegment::BseFo),
            "MCX" => Some(ExchangeSegment::McxFo),
            "NCDEX" => Some(ExchangeSegment::NcdexFo),
            "CDS" => Some(ExchangeSegment::CdsFo),
            _ => None,
        }
    }
}

impl std::fmt::Display for ExchangeSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExchangeSegment::NseCash => "NSE_CASH",
            ExchangeSegment::NseFo => "NSE_FO",
            ExchangeSegment::BseCash => "BSE_CASH",
            ExchangeSegment::BseFo => "BSE_FO",
            ExchangeSegment::McxFo => "MCX_FO",
            ExchangeSegment::NcdexFo => "NCDEX_FO",
            ExchangeSegment::CdsFo => "CDS_FO",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ExchangeSegment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NSE_CASH" => Ok(ExchangeSegment::NseCash),
            "NSE_FO" => Ok(ExchangeSegment::NseFo),
            "BSE_CASH" => Ok(ExchangeSegment::BseCash),
            "BSE_FO" => Ok(ExchangeSegment::BseFo),
            "MCX_FO" => Ok(ExchangeSegment::McxFo),
            "NCDEX_FO" => Ok(ExchangeSegment::NcdexFo),
            "CDS_FO" => Ok(ExchangeSegment::CdsFo),
            other => Err(format!("unknown exchange segment '{other}'")),
        }
    }
}

/// One row of the instrument master. Immutable after load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentRecord {
    pub token: String,
    pub trading_symbol: String,
    pub segment: ExchangeSegment,
}

/// Raw tick from the feed transport. The price arrives in minor units
/// (scaled by 100) and must be divided before use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tick {
    pub token: String,
    pub ltp_paise: i64,
}

impl Tick {
    pub fn price(&self) -> f64 {
        self.ltp_paise as f64 / 100.0
    }
}

/// Decoded tick broadcast inside the process after symbol resolution.
#[derive(Debug, Clone)]
pub struct TickEvent {
    pub token: String,
    pub symbol: String,
    pub ltp: f64,
}

/// One OHLCV candle, chronological within a series. Never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Latest MACD values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MacdValue {
    pub line: f64,
    pub signal: f64,
    pub histogram: f64,
}

/// Latest ADX and directional indicator values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdxValue {
    pub adx: f64,
    pub di_plus: f64,
    pub di_minus: f64,
}

/// Derived indicator values for one instrument, recomputed on each
/// historical refresh. `None` means "not enough bars" and is a normal
/// result, not an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub rsi: Option<f64>,
    pub macd: Option<MacdValue>,
    pub adx: Option<AdxValue>,
}

/// Direction of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Long,
    Short,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Long => write!(f, "LONG"),
            Side::Short => write!(f, "SHORT"),
        }
    }
}

impl std::str::FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LONG" => Ok(Side::Long),
            "SHORT" => Ok(Side::Short),
            other => Err(format!("unknown side '{other}'")),
        }
    }
}

/// What the evaluator knows about the instrument's current exposure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurrentSide {
    Flat,
    Long,
    Short,
}

impl From<Option<Side>> for CurrentSide {
    fn from(side: Option<Side>) -> Self {
        match side {
            None => CurrentSide::Flat,
            Some(Side::Long) => CurrentSide::Long,
            Some(Side::Short) => CurrentSide::Short,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionStatus {
    Open,
    Closed,
}

impl std::fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PositionStatus::Open => write!(f, "OPEN"),
            PositionStatus::Closed => write!(f, "CLOSED"),
        }
    }
}

/// A tracked position. At most one position with `status == Open` may exist
/// per instrument token at any time; the position manager enforces this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub token: String,
    pub symbol: String,
    pub segment: ExchangeSegment,
    pub side: Side,
    pub entry_price: f64,
    pub quantity: f64,
    pub target: f64,
    pub stoploss: f64,
    pub mtm: f64,
    pub status: PositionStatus,
    pub opened_at: DateTime<Utc>,
    pub exit_price: Option<f64>,
    pub exit_time: Option<DateTime<Utc>>,
    pub exit_reason: Option<String>,
}

impl Position {
    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    /// Side-aware PnL against the given price.
    pub fn pnl_at(&self, ltp: f64) -> f64 {
        match self.side {
            Side::Long => (ltp - self.entry_price) * self.quantity,
            Side::Short => (self.entry_price - ltp) * self.quantity,
        }
    }
}

/// Confidence attached to ADX entry signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalAction {
    Buy,
    Sell,
    Exit,
}

impl std::fmt::Display for SignalAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalAction::Buy => write!(f, "BUY"),
            SignalAction::Sell => write!(f, "SELL"),
            SignalAction::Exit => write!(f, "EXIT"),
        }
    }
}

/// Signal emitted by a strategy rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeSignal {
    pub action: SignalAction,
    pub reason: String,
    pub confidence: Option<Confidence>,
}

/// Feed session status carried on `status` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedStatus {
    Connected,
    Disconnected,
    Reconnecting,
    Error,
}

impl std::fmt::Display for FeedStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedStatus::Connected => write!(f, "connected"),
            FeedStatus::Disconnected => write!(f, "disconnected"),
            FeedStatus::Reconnecting => write!(f, "reconnecting"),
            FeedStatus::Error => write!(f, "error"),
        }
    }
}

/// Structured events handed to the outbound notification collaborator.
/// The sole output boundary toward any client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEvent {
    Tick {
        token: String,
        symbol: String,
        ltp: f64,
    },
    MtmUpdate {
        token: String,
        symbol: String,
        ltp: f64,
        mtm: f64,
        entry_price: f64,
    },
    PositionOpened {
        position: Position,
    },
    PositionClosed {
        position: Position,
    },
    AutoExit {
        token: String,
        symbol: String,
        exit_price: f64,
        exit_reason: String,
        mtm: f64,
    },
    Status {
        state: FeedStatus,
        detail: String,
    },
    Error {
        message: String,
    },
}

/// Control commands for the feed session.
#[derive(Debug, Clone)]
pub enum FeedCommand {
    Subscribe {
        segment: ExchangeSegment,
        tokens: Vec<String>,
    },
    Unsubscribe {
        segment: ExchangeSegment,
        tokens: Vec<String>,
    },
    Shutdown,
}

/// Commands serialized through the position manager's single-writer loop.
#[derive(Debug, Clone)]
pub enum PositionCommand {
    /// A strategy signal for one instrument, with the price it was
    /// evaluated against.
    Signal {
        token: String,
        symbol: String,
        segment: ExchangeSegment,
        signal: TradeSignal,
        reference_price: f64,
    },
    /// Close one open position at the given price.
    Close {
        token: String,
        exit_price: f64,
        reason: String,
    },
    /// Force-close every open position at its entry price.
    SquareOffAll { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_price_divides_minor_units() {
        let tick = Tick {
            token: "26009".into(),
            ltp_paise: 1_234_550,
        };
        assert!((tick.price() - 12_345.50).abs() < 1e-9);
    }

    #[test]
    fn segment_roundtrips_through_display() {
        for seg in [
            ExchangeSegment::NseCash,
            ExchangeSegment::NseFo,
            ExchangeSegment::BseCash,
            ExchangeSegment::BseFo,
            ExchangeSegment::McxFo,
            ExchangeSegment::NcdexFo,
            ExchangeSegment::CdsFo,
        ] {
            let parsed: ExchangeSegment = seg.to_string().parse().unwrap();
            assert_eq!(parsed, seg);
        }
    }

    #[test]
    fn outbound_event_uses_snake_case_type_tag() {
        let event = OutboundEvent::MtmUpdate {
            token: "26009".into(),
            symbol: "NIFTY".into(),
            ltp: 100.0,
            mtm: 1.5,
            entry_price: 98.5,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "mtm_update");
        assert_eq!(json["symbol"], "NIFTY");
    }

    #[test]
    fn pnl_is_side_aware() {
        let mut pos = Position {
            id: "p1".into(),
            token: "T1".into(),
            symbol: "SBIN-EQ".into(),
            segment: ExchangeSegment::NseCash,
            side: Side::Long,
            entry_price: 100.0,
            quantity: 2.0,
            target: 103.0,
            stoploss: 98.0,
            mtm: 0.0,
            status: PositionStatus::Open,
            opened_at: Utc::now(),
            exit_price: None,
            exit_time: None,
            exit_reason: None,
        };
        assert!((pos.pnl_at(105.0) - 10.0).abs() < 1e-9);
        pos.side = Side::Short;
        assert!((pos.pnl_at(105.0) + 10.0).abs() < 1e-9);
    }
}
