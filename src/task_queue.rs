//! # Task Queue
//!
//! Ticket-based FIFO mutual exclusion, one instance per guild.
//!
//! Callers [`acquire`](TaskQueue::acquire) a [`Ticket`] synchronously, then
//! await [`Ticket::wait`] to become head-of-line. The returned [`TaskGuard`]
//! releases control when dropped, so every exit path of the guarded operation
//! (including `?` propagation) hands the queue to the next ticket.
//!
//! A guard that is leaked (e.g. `std::mem::forget`) stalls every later caller
//! on that guild. That is a programming error, not a runtime condition.

use parking_lot::Mutex;
use std::{collections::VecDeque, sync::Arc};
use tokio::sync::oneshot;
use tracing::debug;

#[derive(Debug, Default)]
struct State {
    next_seq: u64,
    current: Option<u64>,
    waiters: VecDeque<(u64, oneshot::Sender<()>)>,
}

impl State {
    /// Entrega el turno al siguiente ticket vivo
    fn advance(&mut self) {
        self.current = None;
        while let Some((seq, tx)) = self.waiters.pop_front() {
            if tx.send(()).is_ok() {
                self.current = Some(seq);
                return;
            }
            debug!("Ticket {} abandonado, saltando", seq);
        }
    }
}

/// FIFO serializer for mutating operations on one guild.
#[derive(Debug, Clone, Default)]
pub struct TaskQueue {
    state: Arc<Mutex<State>>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserva un ticket; nunca bloquea.
    pub fn acquire(&self) -> Ticket {
        let mut state = self.state.lock();
        let seq = state.next_seq;
        state.next_seq += 1;

        let (tx, rx) = oneshot::channel();
        if state.current.is_none() && state.waiters.is_empty() {
            state.current = Some(seq);
            let _ = tx.send(());
        } else {
            state.waiters.push_back((seq, tx));
        }

        Ticket {
            seq,
            rx: Some(rx),
            state: self.state.clone(),
        }
    }

    /// Número de tickets en espera (sin contar el actual)
    pub fn pending(&self) -> usize {
        self.state.lock().waiters.len()
    }

    /// `true` when nobody holds or waits for the queue.
    pub fn is_idle(&self) -> bool {
        let state = self.state.lock();
        state.current.is_none() && state.waiters.is_empty()
    }

    /// Sequence number of the ticket currently executing, if any.
    pub fn current(&self) -> Option<u64> {
        self.state.lock().current
    }
}

/// A place in line. Await [`Ticket::wait`] to take control.
#[derive(Debug)]
pub struct Ticket {
    seq: u64,
    rx: Option<oneshot::Receiver<()>>,
    state: Arc<Mutex<State>>,
}

impl Ticket {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Suspende hasta que todos los tickets anteriores hayan sido liberados.
    pub async fn wait(mut self) -> TaskGuard {
        // rx stays in place while suspended so a cancelled wait is cleaned up by Drop
        if let Some(rx) = self.rx.as_mut() {
            let _ = rx.await;
        }
        self.rx = None;
        TaskGuard {
            seq: self.seq,
            state: Some(self.state.clone()),
        }
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        // rx still present: the ticket was never awaited
        if self.rx.take().is_none() {
            return;
        }
        let mut state = self.state.lock();
        if state.current == Some(self.seq) {
            state.advance();
        } else {
            state.waiters.retain(|(seq, _)| *seq != self.seq);
        }
    }
}

/// Scoped ownership of the queue. Dropping it releases the turn.
#[derive(Debug)]
#[must_use = "the queue is released as soon as the guard is dropped"]
pub struct TaskGuard {
    seq: u64,
    state: Option<Arc<Mutex<State>>>,
}

impl TaskGuard {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Libera el turno explícitamente.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if let Some(state) = self.state.take() {
            let mut state = state.lock();
            if state.current == Some(self.seq) {
                state.advance();
            }
        }
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.release_inner();
    }
}
