//! Watches the browser's outgoing requests for the IdP's POST to the service
//! provider and turns it into exactly one [`ExtractionResult`].

use std::sync::Mutex;

use futures::{Stream, StreamExt};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::browser::{BrowserEvent, OutgoingRequest};
use crate::error::Result;
use crate::saml::{extract, ExtractionResult};

/// Single-use slot shared between the event listener and the waiting session.
pub struct Handoff<T> {
    sender: Mutex<Option<oneshot::Sender<T>>>,
}

impl<T> Handoff<T> {
    pub fn channel() -> (Self, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                sender: Mutex::new(Some(tx)),
            },
            rx,
        )
    }

    /// Hand `value` over. Returns `false` and drops `value` if something was
    /// already delivered.
    pub fn deliver(&self, value: T) -> bool {
        let sender = match self.sender.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        match sender {
            // A closed receiver means the session stopped waiting; still spent.
            Some(tx) => {
                let _ = tx.send(value);
                true
            }
            None => false,
        }
    }

    pub fn is_spent(&self) -> bool {
        match self.sender.lock() {
            Ok(slot) => slot.is_none(),
            Err(poisoned) => poisoned.into_inner().is_none(),
        }
    }
}

pub struct SamlInterceptor {
    consumer_url: String,
    handoff: Handoff<Result<ExtractionResult>>,
    cancel: CancellationToken,
}

impl SamlInterceptor {
    pub fn new(
        consumer_url: impl Into<String>,
        cancel: CancellationToken,
    ) -> (Self, oneshot::Receiver<Result<ExtractionResult>>) {
        let (handoff, rx) = Handoff::channel();
        (
            Self {
                consumer_url: consumer_url.into(),
                handoff,
                cancel,
            },
            rx,
        )
    }

    /// The captured body, if `request` is the IdP posting the SAML response.
    fn captured_body<'r>(&self, request: &'r OutgoingRequest) -> Option<&'r str> {
        if request.method != "POST" || !request.url.contains(&self.consumer_url) {
            return None;
        }
        request.first_body()
    }

    /// Handle one browser event. Returns `true` once the result has been
    /// delivered; later events are ignored.
    pub fn on_event(&self, event: &BrowserEvent) -> bool {
        if self.handoff.is_spent() {
            return true;
        }
        let BrowserEvent::RequestWillBeSent(request) = event else {
            return false;
        };
        let Some(body) = self.captured_body(request) else {
            return false;
        };

        log::info!("captured SAML response posted to {}", request.url);
        let result = extract(body);
        if let Err(e) = &result {
            log::debug!("captured SAML response could not be read: {e}");
        }

        self.cancel.cancel();
        self.handoff.deliver(result);
        true
    }

    /// Consume `events` until a result is delivered or the stream ends.
    ///
    /// If the stream ends first the receiver sees the sender dropped, which
    /// the session reports as the browser having closed.
    pub async fn observe<S>(self, events: S)
    where
        S: Stream<Item = BrowserEvent>,
    {
        futures::pin_mut!(events);
        while let Some(event) = events.next().await {
            if self.on_event(&event) {
                break;
            }
        }
        log::debug!("stopped watching browser events");
    }
}
