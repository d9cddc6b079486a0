//! Handler trait and type erasure.
//!
//! # How method callables are stored
//!
//! A branch's method table holds callables of *different* types in a single
//! `HashMap<String, Method>`. Each one is hidden behind a trait object
//! (`dyn ErasedHandler`) so the table can store them uniformly.
//!
//! ```text
//! async fn login(call: Call) -> Result<Session, E> { … }   ← user writes this
//!        ↓ NodeBuilder::method(MethodSpec::new("login"), login)
//! login.into_boxed_handler()                               ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(login))                               ← heap-allocated wrapper
//!        ↓  stored as BoxedHandler = Arc<dyn ErasedHandler>
//! handler.call(call)  at dispatch time                     ← one vtable dispatch
//!        ↓
//! Box::pin(async { login(call).await.into_reply() })       ← BoxFuture
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::error::BoxError;
use crate::request::Call;

// ── Internal types ────────────────────────────────────────────────────────────

/// What every method resolves to once erased.
pub type Reply = Result<Value, BoxError>;

/// A heap-allocated, type-erased future that resolves to a [`Reply`].
pub(crate) type BoxFuture = Pin<Box<dyn Future<Output = Reply> + Send + 'static>>;

/// Internal dispatch interface.
///
/// `#[doc(hidden)] pub` rather than `pub(crate)` because it appears in the
/// return type of the public `Handler` trait's `into_boxed_handler` method.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, call: Call) -> BoxFuture;
}

/// A type-erased method callable shared across concurrent dispatches.
#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

// ── IntoReply ─────────────────────────────────────────────────────────────────

/// Converts a method's return value into a [`Reply`].
///
/// Any `Result<T, E>` works when `T` serializes and `E` converts into a boxed
/// error. A bare [`Value`] is always a success.
pub trait IntoReply {
    fn into_reply(self) -> Reply;
}

impl<T, E> IntoReply for Result<T, E>
where
    T: Serialize,
    E: Into<BoxError>,
{
    fn into_reply(self) -> Reply {
        let value = self.map_err(Into::into)?;
        Ok(serde_json::to_value(value)?)
    }
}

impl IntoReply for Value {
    fn into_reply(self) -> Reply {
        Ok(self)
    }
}

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Implemented for every valid method callable.
///
/// You never implement this yourself. It is satisfied for any function or
/// closure with the shape:
///
/// ```text
/// async fn name(call: Call) -> impl IntoReply
/// ```
///
/// The trait is sealed: only the blanket impl below can satisfy it.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

// ── Blanket implementations ───────────────────────────────────────────────────

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Call) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoReply + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Call) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoReply + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

// ── Concrete wrapper ──────────────────────────────────────────────────────────

/// Holds a concrete callable `F` and implements [`ErasedHandler`] for it.
struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Call) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoReply + Send + 'static,
{
    fn call(&self, call: Call) -> BoxFuture {
        let fut = (self.0)(call);
        Box::pin(async move { fut.await.into_reply() })
    }
}
