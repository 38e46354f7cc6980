// =============================================================================
// Market data ingestion (C1 wire transport)
// =============================================================================
//
// Connects to the Binance USD-M futures combined WebSocket stream for one
// symbol and feeds normalized events onto the channel the main loop drains
// at the top of each tick. Follows the same `connect_async` + `.split()` +
// `read.next().await` loop shape used throughout `market_data/` for spot
// streams, adapted to futures endpoints and a single combined connection
// instead of one socket per stream.

use anyhow::{Context, Result};
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{error, info, warn};

use crate::events::{parse_agg_trade, parse_book_ticker, parse_depth_update, parse_force_order, RawEvent};

const RECONNECT_DELAY_SECS: u64 = 5;
const MAX_RECONNECT_DELAY_SECS: u64 = 60;

/// Run one combined-stream connection for `symbol` until it disconnects or
/// errors, pushing normalized events onto `tx`. Returns so the caller can
/// decide how to handle reconnection.
pub async fn run_ingest_stream(symbol: &str, tx: mpsc::Sender<RawEvent>) -> Result<()> {
    let lower = symbol.to_lowercase();
    let url = format!(
        "wss://fstream.binance.com/stream?streams={lower}@depth20@100ms/{lower}@bookTicker/{lower}@aggTrade/{lower}@forceOrder"
    );
    info!(url = %url, symbol = %symbol, "connecting to futures combined WebSocket");

    let (ws_stream, _response) = connect_async(&url).await.context("failed to connect to futures combined WebSocket")?;

    info!(symbol = %symbol, "futures combined WebSocket connected");
    let (_write, mut read) = ws_stream.split();

    loop {
        match read.next().await {
            Some(Ok(Message::Text(text))) => dispatch(&text, &tx),
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                error!(symbol = %symbol, error = %e, "futures combined WebSocket read error");
                return Err(e.into());
            }
            None => {
                warn!(symbol = %symbol, "futures combined WebSocket stream ended");
                return Ok(());
            }
        }
    }
}

/// Route one combined-stream envelope to the matching parser based on the
/// `stream` field's suffix, then push the result onto the channel. A full
/// channel drops the event rather than blocking the reader; a parse failure
/// is logged and otherwise ignored, same tolerance as the rest of this
/// module's wire parsing.
fn dispatch(text: &str, tx: &mpsc::Sender<RawEvent>) {
    let Ok(root) = serde_json::from_str::<serde_json::Value>(text) else {
        warn!("failed to parse combined-stream envelope");
        return;
    };
    let Some(stream) = root.get("stream").and_then(|v| v.as_str()) else {
        return;
    };

    let event = if stream.ends_with("@depth20@100ms") {
        parse_depth_update(text).map(RawEvent::Depth)
    } else if stream.ends_with("@bookTicker") {
        parse_book_ticker(text).map(RawEvent::Ticker)
    } else if stream.ends_with("@aggTrade") {
        parse_agg_trade(text).map(RawEvent::Trade)
    } else if stream.ends_with("@forceOrder") {
        parse_force_order(text).map(RawEvent::Liquidation)
    } else {
        return;
    };

    match event {
        Ok(event) => {
            if tx.try_send(event).is_err() {
                warn!(stream = %stream, "ingestion channel full, dropping event");
            }
        }
        Err(e) => warn!(stream = %stream, error = %e, "failed to parse combined-stream payload"),
    }
}

/// Spawn the ingestion task with the reconnect-with-backoff loop used
/// throughout `market_data/`: on error, sleep and retry; the backoff delay
/// doubles each consecutive failure up to a ceiling, and resets to the base
/// delay after a connection that stays up for at least that long.
pub fn spawn(symbol: String, tx: mpsc::Sender<RawEvent>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut delay = RECONNECT_DELAY_SECS;
        loop {
            let started = std::time::Instant::now();
            if let Err(e) = run_ingest_stream(&symbol, tx.clone()).await {
                error!(symbol = %symbol, error = %e, "ingestion stream error, reconnecting");
            }
            if started.elapsed() >= std::time::Duration::from_secs(MAX_RECONNECT_DELAY_SECS) {
                delay = RECONNECT_DELAY_SECS;
            } else {
                delay = (delay * 2).min(MAX_RECONNECT_DELAY_SECS);
            }
            tokio::time::sleep(std::time::Duration::from_secs(delay)).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dispatch_routes_by_stream_suffix() {
        let (tx, mut rx) = mpsc::channel(8);
        let text = r#"{"stream":"btcusdt@aggTrade","data":{"E":1000,"p":"50000.5","q":"0.01","m":false}}"#;
        dispatch(text, &tx);
        let event = rx.try_recv().expect("event queued");
        assert!(matches!(event, RawEvent::Trade(_)));
    }

    #[tokio::test]
    async fn dispatch_ignores_unknown_stream() {
        let (tx, mut rx) = mpsc::channel(8);
        let text = r#"{"stream":"btcusdt@markPrice","data":{}}"#;
        dispatch(text, &tx);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn dispatch_drops_on_full_channel() {
        let (tx, _rx) = mpsc::channel(1);
        let text = r#"{"stream":"btcusdt@aggTrade","data":{"E":1000,"p":"1","q":"1","m":false}}"#;
        dispatch(text, &tx);
        dispatch(text, &tx);
    }
}
