// =============================================================================
// Event intake (C1)
// =============================================================================
//
// Normalizes raw exchange wire messages into the four typed event records the
// rest of the engine consumes. The ingestion task is the sole producer onto
// the bounded channels defined here; it never touches decision state
// directly. Parsing follows `market_data/candle_buffer.rs`'s
// numeric-string-tolerant idiom: Binance sends many numeric fields as JSON
// strings, so every price/qty field is parsed through `parse_numeric`.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::types::{LiquidationSide, PriceLevel};

/// Capacity of each ingestion channel. Sized generously above the 2 s tick
/// cadence so a slow tick never backs up the WebSocket reader; a full
/// channel drops the incoming event rather than blocking ingestion.
pub const CHANNEL_CAPACITY: usize = 4_096;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepthUpdate {
    pub ts_ms: i64,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BookTicker {
    pub ts_ms: i64,
    pub best_bid: f64,
    pub best_ask: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AggTrade {
    pub ts_ms: i64,
    pub price: f64,
    pub qty: f64,
    pub buyer_is_maker: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ForceOrder {
    pub ts_ms: i64,
    pub side: LiquidationSide,
    pub qty: f64,
    pub price: f64,
}

/// Normalized event the main loop drains at the top of each tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RawEvent {
    Depth(DepthUpdate),
    Ticker(BookTicker),
    Trade(AggTrade),
    Liquidation(ForceOrder),
}

/// Sender half handed to the ingestion task; receiver half drained by the
/// main loop. A bounded `mpsc` channel is the single handoff point between
/// the ingestion task and the decision state it never otherwise touches.
pub fn channel() -> (mpsc::Sender<RawEvent>, mpsc::Receiver<RawEvent>) {
    mpsc::channel(CHANNEL_CAPACITY)
}

fn parse_numeric(val: &serde_json::Value, field: &str) -> Result<f64> {
    match val {
        serde_json::Value::String(s) => s
            .parse::<f64>()
            .with_context(|| format!("field {field} is not a valid numeric string: {s}")),
        serde_json::Value::Number(n) => n.as_f64().with_context(|| format!("field {field} is not a valid f64")),
        _ => bail!("field {field} has unexpected JSON type"),
    }
}

fn parse_levels(arr: &serde_json::Value, field: &str) -> Result<Vec<PriceLevel>> {
    let arr = arr.as_array().with_context(|| format!("field {field} is not an array"))?;
    arr.iter()
        .map(|pair| {
            let pair = pair.as_array().with_context(|| format!("{field} entry is not [price, qty]"))?;
            let price = pair.first().context("missing price")?;
            let qty = pair.get(1).context("missing qty")?;
            Ok(PriceLevel {
                price: parse_numeric(price, "price")?,
                quantity: parse_numeric(qty, "qty")?,
            })
        })
        .collect()
}

/// Parse a Binance-style `depthUpdate` payload: `{E, b: [[price,qty],...], a: [...]}`.
pub fn parse_depth_update(text: &str) -> Result<DepthUpdate> {
    let root: serde_json::Value = serde_json::from_str(text).context("failed to parse depth JSON")?;
    let data = if root.get("data").is_some() { &root["data"] } else { &root };
    let ts_ms = data["E"].as_i64().context("missing field E")?;
    let bids = parse_levels(&data["b"], "b")?;
    let asks = parse_levels(&data["a"], "a")?;
    Ok(DepthUpdate { ts_ms, bids, asks })
}

/// Parse a Binance-style `bookTicker` payload: `{E, b, a}` (best bid/ask).
pub fn parse_book_ticker(text: &str) -> Result<BookTicker> {
    let root: serde_json::Value = serde_json::from_str(text).context("failed to parse book ticker JSON")?;
    let data = if root.get("data").is_some() { &root["data"] } else { &root };
    let ts_ms = data["E"].as_i64().unwrap_or(0);
    let best_bid = parse_numeric(&data["b"], "b")?;
    let best_ask = parse_numeric(&data["a"], "a")?;
    Ok(BookTicker { ts_ms, best_bid, best_ask })
}

/// Parse a Binance-style `aggTrade` payload: `{E, p, q, m}`.
pub fn parse_agg_trade(text: &str) -> Result<AggTrade> {
    let root: serde_json::Value = serde_json::from_str(text).context("failed to parse trade JSON")?;
    let data = if root.get("data").is_some() { &root["data"] } else { &root };
    let ts_ms = data["E"].as_i64().context("missing field E")?;
    let price = parse_numeric(&data["p"], "p")?;
    let qty = parse_numeric(&data["q"], "q")?;
    let buyer_is_maker = data["m"].as_bool().context("missing field m")?;
    Ok(AggTrade { ts_ms, price, qty, buyer_is_maker })
}

/// Parse a Binance-style forced liquidation `forceOrder` payload:
/// `{E, o: {S, q, p}}`. `S` is `"SELL"` when a long was force-closed.
pub fn parse_force_order(text: &str) -> Result<ForceOrder> {
    let root: serde_json::Value = serde_json::from_str(text).context("failed to parse force order JSON")?;
    let data = if root.get("data").is_some() { &root["data"] } else { &root };
    let ts_ms = data["E"].as_i64().context("missing field E")?;
    let order = &data["o"];
    let side_str = order["S"].as_str().context("missing field o.S")?;
    let side = match side_str {
        "SELL" => LiquidationSide::Sell,
        "BUY" => LiquidationSide::Buy,
        other => bail!("unrecognized liquidation side: {other}"),
    };
    let qty = parse_numeric(&order["q"], "o.q")?;
    let price = parse_numeric(&order["p"], "o.p")?;
    Ok(ForceOrder { ts_ms, side, qty, price })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_numeric_string_fields() {
        let text = r#"{"E":1000,"p":"50000.5","q":"0.01","m":false}"#;
        let trade = parse_agg_trade(text).unwrap();
        assert_eq!(trade.price, 50000.5);
        assert!(!trade.buyer_is_maker);
    }

    #[test]
    fn parses_depth_levels() {
        let text = r#"{"E":1000,"b":[["100.0","2.0"]],"a":[["100.5","1.0"]]}"#;
        let depth = parse_depth_update(text).unwrap();
        assert_eq!(depth.bids[0].price, 100.0);
        assert_eq!(depth.asks[0].quantity, 1.0);
    }

    #[test]
    fn force_order_sell_side_is_long_liquidation() {
        let text = r#"{"E":1000,"o":{"S":"SELL","q":"1.5","p":"49000.0"}}"#;
        let fo = parse_force_order(text).unwrap();
        assert_eq!(fo.side, LiquidationSide::Sell);
    }

    #[test]
    fn malformed_json_is_an_error_not_a_panic() {
        assert!(parse_agg_trade("not json").is_err());
    }
}
