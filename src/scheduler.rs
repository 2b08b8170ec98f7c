use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::connection::Event;

/// Delivers `Event::ReconnectDue` for one scheduled reconnect.
#[derive(Debug)]
pub struct ReconnectSink {
    token: u64,
    tx: mpsc::UnboundedSender<Event>,
}

impl ReconnectSink {
    pub(crate) fn new(token: u64, tx: mpsc::UnboundedSender<Event>) -> Self {
        Self { token, tx }
    }

    pub fn token(&self) -> u64 {
        self.token
    }

    pub fn fire(self) {
        let _ = self.tx.send(Event::ReconnectDue { token: self.token });
    }
}

pub trait Scheduler: Send + Sync {
    fn schedule(&self, delay: Duration, due: ReconnectSink) -> Box<dyn PendingTimer>;
}

pub trait PendingTimer: Send {
    fn cancel(self: Box<Self>);
}

/// Sleeps on the tokio timer in a spawned task.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, due: ReconnectSink) -> Box<dyn PendingTimer> {
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            due.fire();
        });
        Box::new(TokioTimer(task))
    }
}

struct TokioTimer(JoinHandle<()>);

impl PendingTimer for TokioTimer {
    fn cancel(self: Box<Self>) {
        self.0.abort();
    }
}
