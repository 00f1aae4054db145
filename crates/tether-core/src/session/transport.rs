//! Outbound side of the live conversation provider.
//!
//! `LiveTransport` is the narrow interface a session uses to talk back to
//! the provider: text turns (user messages or memory priming) and tool
//! responses. `BoxLiveTransport` is its dynamic-dispatch wrapper.

use std::future::Future;
use std::pin::Pin;

use tether_types::error::TransportError;

/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
pub trait LiveTransport: Send + Sync {
    /// Send a text turn. `turn_complete` asks the provider to respond.
    fn send_text(
        &self,
        text: &str,
        turn_complete: bool,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Answer a tool call.
    fn send_tool_response(
        &self,
        call_id: Option<&str>,
        name: &str,
        result: &str,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}

type BoxFuture<'a> = Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + 'a>>;

/// Object-safe version of [`LiveTransport`] with boxed futures.
pub trait LiveTransportDyn: Send + Sync {
    fn send_text_boxed<'a>(&'a self, text: &'a str, turn_complete: bool) -> BoxFuture<'a>;

    fn send_tool_response_boxed<'a>(
        &'a self,
        call_id: Option<&'a str>,
        name: &'a str,
        result: &'a str,
    ) -> BoxFuture<'a>;
}

impl<T: LiveTransport> LiveTransportDyn for T {
    fn send_text_boxed<'a>(&'a self, text: &'a str, turn_complete: bool) -> BoxFuture<'a> {
        Box::pin(self.send_text(text, turn_complete))
    }

    fn send_tool_response_boxed<'a>(
        &'a self,
        call_id: Option<&'a str>,
        name: &'a str,
        result: &'a str,
    ) -> BoxFuture<'a> {
        Box::pin(self.send_tool_response(call_id, name, result))
    }
}

pub struct BoxLiveTransport {
    inner: Box<dyn LiveTransportDyn + Send + Sync>,
}

impl BoxLiveTransport {
    pub fn new<T: LiveTransport + 'static>(transport: T) -> Self {
        Self {
            inner: Box::new(transport),
        }
    }

    pub async fn send_text(&self, text: &str, turn_complete: bool) -> Result<(), TransportError> {
        self.inner.send_text_boxed(text, turn_complete).await
    }

    pub async fn send_tool_response(
        &self,
        call_id: Option<&str>,
        name: &str,
        result: &str,
    ) -> Result<(), TransportError> {
        self.inner
            .send_tool_response_boxed(call_id, name, result)
            .await
    }
}
