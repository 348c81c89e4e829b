//! Generic message transmission used by the three UI-boundary queues (`spec.md` §4.H) and by
//! the backtester's internal Market/Signal/Order/Fill bus (`spec.md` §4.E), grounded on
//! `src/event.rs`'s `EventTx`/`MessageTransmitter` pair in the teacher.

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::warn;

/// Sends a message to an external subscriber, tolerating a dropped receiver rather than
/// panicking — matches `spec.md` §4.H's "the UI ... never calls into Core directly", i.e. the
/// producer side must survive the consumer going away.
pub trait MessageTransmitter<Message> {
    fn send(&mut self, message: Message);
    fn send_many(&mut self, messages: Vec<Message>);
}

/// Unbounded transmitter for a single queue. One `Tx<Event>`, one `Tx<LogLine>`, and one
/// `Tx<AccountSnapshot>` make up the three queues of `spec.md` §4.H.
#[derive(Debug, Clone)]
pub struct Tx<Message> {
    receiver_dropped: bool,
    tx: mpsc::UnboundedSender<Message>,
}

impl<Message> Tx<Message> {
    pub fn new(tx: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            receiver_dropped: false,
            tx,
        }
    }
}

impl<Message> MessageTransmitter<Message> for Tx<Message> {
    fn send(&mut self, message: Message) {
        if self.receiver_dropped {
            return;
        }

        if self.tx.send(message).is_err() {
            warn!(
                action = "setting receiver_dropped = true",
                why = "queue receiver dropped",
                "cannot send message"
            );
            self.receiver_dropped = true;
        }
    }

    fn send_many(&mut self, messages: Vec<Message>) {
        if self.receiver_dropped {
            return;
        }

        for message in messages {
            if self.tx.send(message).is_err() {
                self.receiver_dropped = true;
                break;
            }
        }
    }
}

/// The four event kinds that drive the backtester's main loop (`spec.md` §4.E, GLOSSARY).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum BacktestEvent {
    Market(crate::backtest::data::MarketEvent),
    Signal(crate::backtest::portfolio::SignalEvent),
    Order(crate::backtest::execution::OrderEvent),
    Fill(crate::backtest::execution::FillEvent),
}
