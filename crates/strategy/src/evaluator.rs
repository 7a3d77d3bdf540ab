use common::{
    AdxValue, Confidence, CurrentSide, IndicatorSnapshot, MacdValue, SignalAction, TradeSignal,
};

/// +DI / −DI level above which the ADX rule enters a position.
pub const DI_ENTRY: f64 = 20.0;
/// +DI / −DI level below which the ADX rule exits.
pub const DI_EXIT: f64 = 18.0;

/// Run both rule sets over one snapshot. ADX first, then MACD; both may
/// fire in the same cycle, and the position manager's single-open invariant
/// absorbs duplicate entries.
pub fn evaluate(snapshot: &IndicatorSnapshot, side: CurrentSide) -> Vec<TradeSignal> {
    let mut signals = Vec::new();
    if let Some(adx) = &snapshot.adx {
        if let Some(s) = adx_rule(adx, side) {
            signals.push(s);
        }
    }
    if let Some(macd) = &snapshot.macd {
        if let Some(s) = macd_rule(macd, side) {
            signals.push(s);
        }
    }
    signals
}

/// ADX rule:
/// - flat: BUY when +DI > 20, SELL when −DI > 20 (+DI checked first, so BUY
///   wins when both exceed the threshold)
/// - long: EXIT when +DI < 18
/// - short: EXIT when −DI < 18
pub fn adx_rule(adx: &AdxValue, side: CurrentSide) -> Option<TradeSignal> {
    match side {
        CurrentSide::Flat => {
            if adx.di_plus > DI_ENTRY {
                Some(TradeSignal {
                    action: SignalAction::Buy,
                    reason: format!("+DI {:.2} > {DI_ENTRY} (strong uptrend)", adx.di_plus),
                    confidence: Some(if adx.di_plus > adx.di_minus {
                        Confidence::High
                    } else {
                        Confidence::Medium
                    }),
                })
            } else if adx.di_minus > DI_ENTRY {
                Some(TradeSignal {
                    action: SignalAction::Sell,
                    reason: format!("-DI {:.2} > {DI_ENTRY} (strong downtrend)", adx.di_minus),
                    confidence: Some(if adx.di_minus > adx.di_plus {
                        Confidence::High
                    } else {
                        Confidence::Medium
                    }),
                })
            } else {
                None
            }
        }
        CurrentSide::Long if adx.di_plus < DI_EXIT => Some(TradeSignal {
            action: SignalAction::Exit,
            reason: format!("+DI fell to {:.2} < {DI_EXIT} (uptrend weakening)", adx.di_plus),
            confidence: None,
        }),
        CurrentSide::Short if adx.di_minus < DI_EXIT => Some(TradeSignal {
            action: SignalAction::Exit,
            reason: format!(
                "-DI fell to {:.2} < {DI_EXIT} (downtrend weakening)",
                adx.di_minus
            ),
            confidence: None,
        }),
        _ => None,
    }
}

/// MACD rule:
/// - flat: BUY when the MACD line > 0, SELL when < 0
/// - long: EXIT when the line < 0
/// - short: EXIT when the line > 0
pub fn macd_rule(macd: &MacdValue, side: CurrentSide) -> Option<TradeSignal> {
    match side {
        CurrentSide::Flat => {
            if macd.line > 0.0 {
                Some(TradeSignal {
                    action: SignalAction::Buy,
                    reason: format!("MACD line {:.4} > 0 (bullish)", macd.line),
                    confidence: None,
                })
            } else if macd.line < 0.0 {
                Some(TradeSignal {
                    action: SignalAction::Sell,
                    reason: format!("MACD line {:.4} < 0 (bearish)", macd.line),
                    confidence: None,
                })
            } else {
                None
            }
        }
        CurrentSide::Long if macd.line < 0.0 => Some(TradeSignal {
            action: SignalAction::Exit,
            reason: "MACD line crossed below 0 (bearish crossover)".to_string(),
            confidence: None,
        }),
        CurrentSide::Short if macd.line > 0.0 => Some(TradeSignal {
            action: SignalAction::Exit,
            reason: "MACD line crossed above 0 (bullish crossover)".to_string(),
            confidence: None,
        }),
        _ => None,
    }
}
