// Scripted in-memory brokerage for integration tests
#![allow(dead_code)]

use chrono::{Duration, Utc};
use spreadbot::api::{Brokerage, CancelResponse, SubmitResponse};
use spreadbot::models::{
    Holding, Interval, LimitOrder, OrderState, OrderStatus, PriceBar, Quote, Security, Span,
};
use spreadbot::persistence::CounterStore;
use spreadbot::{Result, TradeError};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Replays items in order, then repeats the last one forever
struct Script<T> {
    queue: VecDeque<T>,
    last: Option<T>,
}

impl<T: Clone> Script<T> {
    fn new(items: Vec<T>) -> Self {
        Self {
            queue: items.into(),
            last: None,
        }
    }

    fn next(&mut self, what: &str) -> Result<T> {
        if let Some(item) = self.queue.pop_front() {
            self.last = Some(item.clone());
        }
        self.last
            .clone()
            .ok_or_else(|| TradeError::UpstreamUnavailable(format!("no scripted {}", what)))
    }
}

pub struct ScriptedBroker {
    submits: Mutex<Script<SubmitResponse>>,
    statuses: Mutex<Script<OrderStatus>>,
    cancels: Mutex<Script<CancelResponse>>,
    quotes: Mutex<Script<Quote>>,
    history: Mutex<HashMap<Security, Vec<PriceBar>>>,
    positions: Mutex<Vec<Holding>>,
    buying_power: Mutex<f64>,
    orders: Mutex<Vec<LimitOrder>>,
    /// 1-based status calls that fail as if the venue were unreachable
    status_outage: Mutex<Range<usize>>,
    status_calls: AtomicUsize,
    cancel_calls: AtomicUsize,
    quote_calls: AtomicUsize,
    history_calls: AtomicUsize,
}

impl Default for ScriptedBroker {
    fn default() -> Self {
        Self {
            submits: Mutex::new(Script::new(Vec::new())),
            statuses: Mutex::new(Script::new(Vec::new())),
            cancels: Mutex::new(Script::new(Vec::new())),
            quotes: Mutex::new(Script::new(Vec::new())),
            history: Mutex::new(HashMap::new()),
            positions: Mutex::new(Vec::new()),
            buying_power: Mutex::new(0.0),
            orders: Mutex::new(Vec::new()),
            status_outage: Mutex::new(0..0),
            status_calls: AtomicUsize::new(0),
            cancel_calls: AtomicUsize::new(0),
            quote_calls: AtomicUsize::new(0),
            history_calls: AtomicUsize::new(0),
        }
    }
}

impl ScriptedBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_submits(self, items: Vec<SubmitResponse>) -> Self {
        *self.submits.lock().unwrap() = Script::new(items);
        self
    }

    pub fn with_statuses(self, items: Vec<OrderStatus>) -> Self {
        *self.statuses.lock().unwrap() = Script::new(items);
        self
    }

    pub fn with_cancels(self, items: Vec<CancelResponse>) -> Self {
        *self.cancels.lock().unwrap() = Script::new(items);
        self
    }

    pub fn with_quotes(self, items: Vec<Quote>) -> Self {
        *self.quotes.lock().unwrap() = Script::new(items);
        self
    }

    pub fn with_history(self, security: &str, bars: Vec<PriceBar>) -> Self {
        self.history
            .lock()
            .unwrap()
            .insert(Security::from(security), bars);
        self
    }

    pub fn with_positions(self, holdings: Vec<Holding>) -> Self {
        *self.positions.lock().unwrap() = holdings;
        self
    }

    /// Status calls numbered in `calls` (counting from 1) fail upstream
    /// without consuming the status script
    pub fn with_status_outage(self, calls: Range<usize>) -> Self {
        *self.status_outage.lock().unwrap() = calls;
        self
    }

    pub fn with_buying_power(self, amount: f64) -> Self {
        *self.buying_power.lock().unwrap() = amount;
        self
    }

    /// Every order submitted so far, accepted or not
    pub fn orders(&self) -> Vec<LimitOrder> {
        self.orders.lock().unwrap().clone()
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn cancel_calls(&self) -> usize {
        self.cancel_calls.load(Ordering::SeqCst)
    }

    pub fn quote_calls(&self) -> usize {
        self.quote_calls.load(Ordering::SeqCst)
    }

    pub fn history_calls(&self) -> usize {
        self.history_calls.load(Ordering::SeqCst)
    }
}

impl Brokerage for ScriptedBroker {
    async fn submit_limit_order(&self, order: &LimitOrder) -> Result<SubmitResponse> {
        self.orders.lock().unwrap().push(order.clone());
        self.submits.lock().unwrap().next("submit")
    }

    async fn get_order_status(&self, _order_id: &str) -> Result<OrderStatus> {
        let call = self.status_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.status_outage.lock().unwrap().contains(&call) {
            return Err(TradeError::UpstreamUnavailable(format!(
                "status call {} timed out",
                call
            )));
        }
        self.statuses.lock().unwrap().next("status")
    }

    async fn cancel_order(&self, _order_id: &str) -> Result<CancelResponse> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        self.cancels.lock().unwrap().next("cancel")
    }

    async fn get_quote(&self, _security: &Security) -> Result<Quote> {
        self.quote_calls.fetch_add(1, Ordering::SeqCst);
        self.quotes.lock().unwrap().next("quote")
    }

    async fn get_historicals(
        &self,
        security: &Security,
        _interval: Interval,
        _span: Span,
    ) -> Result<Vec<PriceBar>> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        self.history
            .lock()
            .unwrap()
            .get(security)
            .cloned()
            .ok_or_else(|| TradeError::UpstreamUnavailable(format!("no history for {}", security)))
    }

    async fn get_positions(&self) -> Result<Vec<Holding>> {
        Ok(self.positions.lock().unwrap().clone())
    }

    async fn buying_power(&self) -> Result<f64> {
        Ok(*self.buying_power.lock().unwrap())
    }
}

/// Counter store held in memory, for tests on a paused clock
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
    sets: Mutex<HashMap<String, BTreeSet<String>>>,
}

impl CounterStore for MemoryStore {
    async fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.lock().unwrap().get(key).cloned())
    }

    async fn write(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn members(&self, key: &str) -> Result<Vec<String>> {
        Ok(self
            .sets
            .lock()
            .unwrap()
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn append(&self, key: &str, token: &str) -> Result<()> {
        self.sets
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .insert(token.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str, token: &str) -> Result<()> {
        if let Some(set) = self.sets.lock().unwrap().get_mut(key) {
            set.remove(token);
        }
        Ok(())
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn accepted(id: &str) -> SubmitResponse {
    SubmitResponse::Accepted {
        id: id.to_string(),
        state: OrderState::Confirmed,
    }
}

pub fn rejected(message: &str) -> SubmitResponse {
    SubmitResponse::Rejected {
        message: message.to_string(),
    }
}

pub fn status(state: OrderState) -> OrderStatus {
    OrderStatus {
        state,
        price: None,
        quantity: None,
    }
}

pub fn filled(price: f64, quantity: f64) -> OrderStatus {
    OrderStatus {
        state: OrderState::Filled,
        price: Some(price),
        quantity: Some(quantity),
    }
}

pub fn quote(bid_price: f64) -> Quote {
    Quote {
        bid_price,
        ask_price: bid_price * 1.001,
    }
}

/// `count` flat 5-minute bars at `close` with a trading range of `range`
pub fn flat_bars(count: usize, close: f64, range: f64) -> Vec<PriceBar> {
    let start = Utc::now() - Duration::minutes(5 * count as i64);
    (0..count)
        .map(|i| PriceBar {
            timestamp: start + Duration::minutes(5 * i as i64),
            open: close,
            high: close + range / 2.0,
            low: close - range / 2.0,
            close,
        })
        .collect()
}
