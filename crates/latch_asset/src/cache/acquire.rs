use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Sleep;

use super::{Inner, Outcome};
use crate::{AssetLoader, CacheError};

/// Pending acquisition returned by [`ResourceCache::acquire`](super::ResourceCache::acquire).
///
/// Dropping it before completion detaches this caller from the load. A
/// reference that was already handed to the dropped handle is given back to
/// the cache, unless the entry has since been replaced by a newer load.
#[must_use = "an acquisition holds a reference once it resolves"]
pub struct Acquire<L: AssetLoader> {
    address: String,
    /// Load cycle the reference belongs to.
    load_id: u64,
    /// `None` for acquisitions rejected before reaching the cache.
    cache: Option<Arc<Inner<L>>>,
    state: State<L::Resource>,
}

enum State<R> {
    Resolved(Outcome<R>),
    Waiting {
        rx: oneshot::Receiver<Outcome<R>>,
        deadline: Option<(Duration, Pin<Box<Sleep>>)>,
    },
    Done,
}

impl<L: AssetLoader> Acquire<L> {
    pub(super) fn rejected(address: &str, error: CacheError) -> Self {
        Self {
            address: address.to_string(),
            load_id: 0,
            cache: None,
            state: State::Resolved(Err(error)),
        }
    }

    pub(super) fn resolved(
        cache: Arc<Inner<L>>,
        address: &str,
        load_id: u64,
        outcome: Outcome<L::Resource>,
    ) -> Self {
        Self {
            address: address.to_string(),
            load_id,
            cache: Some(cache),
            state: State::Resolved(outcome),
        }
    }

    pub(super) fn waiting(
        cache: Arc<Inner<L>>,
        address: &str,
        load_id: u64,
        rx: oneshot::Receiver<Outcome<L::Resource>>,
        timeout: Option<Duration>,
    ) -> Self {
        let deadline = timeout.map(|after| (after, Box::pin(tokio::time::sleep(after))));
        Self {
            address: address.to_string(),
            load_id,
            cache: Some(cache),
            state: State::Waiting { rx, deadline },
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Hands the reference this acquisition produced back to its load cycle.
    fn give_back(&self) {
        let Some(cache) = &self.cache else {
            return;
        };
        tracing::debug!(address = %self.address, load_id = self.load_id, "Returning reference of abandoned acquisition");
        if let Err(error) = cache.release_cycle(&self.address, Some(self.load_id)) {
            tracing::debug!(address = %self.address, %error, "Abandoned reference was already gone");
        }
    }
}

impl<L: AssetLoader> Future for Acquire<L> {
    type Output = Outcome<L::Resource>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match std::mem::replace(&mut this.state, State::Done) {
            State::Resolved(outcome) => Poll::Ready(outcome),
            State::Done => panic!("`Acquire` polled after completion"),
            State::Waiting {
                mut rx,
                mut deadline,
            } => {
                if let Poll::Ready(received) = Pin::new(&mut rx).poll(cx) {
                    // The sender only disappears without a value if the cache dropped the waiter.
                    return Poll::Ready(received.unwrap_or_else(|_| {
                        Err(CacheError::Cancelled {
                            address: this.address.clone(),
                        })
                    }));
                }

                if let Some((after, sleep)) = deadline.as_mut() {
                    if sleep.as_mut().poll(cx).is_ready() {
                        rx.close();
                        // The load may have resolved between the two polls; keep its result.
                        if let Ok(outcome) = rx.try_recv() {
                            return Poll::Ready(outcome);
                        }
                        tracing::debug!(address = %this.address, ?after, "Acquire timed out");
                        return Poll::Ready(Err(CacheError::Timeout {
                            address: this.address.clone(),
                            after: *after,
                        }));
                    }
                }

                this.state = State::Waiting { rx, deadline };
                Poll::Pending
            }
        }
    }
}

impl<L: AssetLoader> Drop for Acquire<L> {
    fn drop(&mut self) {
        let delivered = match &mut self.state {
            State::Resolved(outcome) => outcome.is_ok(),
            State::Waiting { rx, .. } => {
                rx.close();
                matches!(rx.try_recv(), Ok(Ok(_)))
            }
            State::Done => false,
        };
        if delivered {
            self.give_back();
        }
    }
}

/// Resolves every acquisition of [`ResourceCache::acquire_many`](super::ResourceCache::acquire_many), in order.
///
/// Dropping it part-way gives back the references of the acquisitions that
/// already resolved and detaches the rest.
#[must_use = "an acquisition holds a reference once it resolves"]
pub struct AcquireMany<L: AssetLoader> {
    slots: Vec<Slot<L>>,
}

struct Slot<L: AssetLoader> {
    acquire: Acquire<L>,
    output: Option<Outcome<L::Resource>>,
}

impl<L: AssetLoader> AcquireMany<L> {
    pub(super) fn new(acquisitions: Vec<Acquire<L>>) -> Self {
        Self {
            slots: acquisitions
                .into_iter()
                .map(|acquire| Slot {
                    acquire,
                    output: None,
                })
                .collect(),
        }
    }
}

impl<L: AssetLoader> Future for AcquireMany<L> {
    type Output = Vec<Outcome<L::Resource>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let mut pending = false;
        for slot in &mut this.slots {
            if slot.output.is_some() {
                continue;
            }
            match Pin::new(&mut slot.acquire).poll(cx) {
                Poll::Ready(outcome) => slot.output = Some(outcome),
                Poll::Pending => pending = true,
            }
        }
        if pending {
            return Poll::Pending;
        }

        Poll::Ready(
            std::mem::take(&mut this.slots)
                .into_iter()
                .filter_map(|slot| slot.output)
                .collect(),
        )
    }
}

impl<L: AssetLoader> Drop for AcquireMany<L> {
    fn drop(&mut self) {
        for slot in &self.slots {
            if matches!(slot.output, Some(Ok(_))) {
                slot.acquire.give_back();
            }
        }
    }
}
