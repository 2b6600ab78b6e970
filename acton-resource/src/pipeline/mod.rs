//! Typed request pipelines
//!
//! A handler is a chain of [`Step`]s. Each step receives the previous step's
//! output plus the per-request [`Exchange`], and either produces the next
//! value or fails with an [`ApiError`]. The first error short-circuits the
//! rest of the chain.
//!
//! Steps compose with [`StepExt::then`]; the output type of one step must be
//! the input type of the next, so a mis-ordered pipeline does not compile.
//!
//! # Example
//!
//! ```rust
//! use acton_resource::handlers::{ApiError, RequestInfo};
//! use acton_resource::pipeline::{Exchange, Pipeline, Step, StepExt};
//! use axum::http::{Method, Uri};
//! use futures::future::{BoxFuture, FutureExt};
//!
//! struct Double;
//!
//! impl Step<u32> for Double {
//!     type Output = u32;
//!
//!     fn name(&self) -> &'static str {
//!         "double"
//!     }
//!
//!     fn run<'a>(
//!         &'a self,
//!         _ex: &'a mut Exchange,
//!         input: u32,
//!     ) -> BoxFuture<'a, Result<u32, ApiError>> {
//!         futures::future::ready(Ok(input * 2)).boxed()
//!     }
//! }
//!
//! let pipeline = Pipeline::new("quadruple", Double.then(Double));
//! let mut exchange = Exchange::new(RequestInfo::new(Method::GET, Uri::from_static("/")));
//!
//! let out = futures::executor::block_on(pipeline.run(&mut exchange, 3)).unwrap();
//! assert_eq!(out, 12);
//! ```

mod steps;

use std::sync::Arc;

use axum::http::HeaderMap;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use tracing::Instrument;

use crate::handlers::{ApiError, RequestInfo};

pub use steps::{
    ApplyBody, Delete, Emit, EventPayload, ExecuteQuery, FindOne, Instantiate, Paginate, Persist,
    Project, ProjectEach, RequireFound, Respond, Responded, RunHooks, SetLocation, TakeBody,
};

/// Per-request state threaded through every step
#[derive(Debug, Clone)]
pub struct Exchange {
    /// The inbound request
    pub request: RequestInfo,
    /// Parsed JSON body; `None` when the request had no body
    pub body: Option<Value>,
    /// Requested page, for list pipelines
    pub page: u64,
    /// Response headers set by steps (`Link`, `Location`)
    pub headers: HeaderMap,
}

impl Exchange {
    /// Exchange without a body
    pub fn new(request: RequestInfo) -> Self {
        Self {
            request,
            body: None,
            page: 0,
            headers: HeaderMap::new(),
        }
    }

    /// Attach the parsed body
    #[must_use]
    pub fn with_body(mut self, body: Option<Value>) -> Self {
        self.body = body;
        self
    }

    /// Set the requested page
    #[must_use]
    pub fn with_page(mut self, page: u64) -> Self {
        self.page = page;
        self
    }
}

/// One stage of a pipeline
pub trait Step<In: Send + 'static>: Send + Sync + 'static {
    /// Value handed to the next step
    type Output: Send + 'static;

    /// Step name used in logs
    fn name(&self) -> &'static str;

    /// Transform `input`, or fail and stop the pipeline
    fn run<'a>(
        &'a self,
        exchange: &'a mut Exchange,
        input: In,
    ) -> BoxFuture<'a, Result<Self::Output, ApiError>>;
}

const COMPOSED: &str = "then";

/// Two steps run in sequence
#[derive(Debug, Clone)]
pub struct Then<A, B> {
    first: A,
    second: B,
}

impl<In, A, B> Step<In> for Then<A, B>
where
    In: Send + 'static,
    A: Step<In>,
    B: Step<A::Output>,
{
    type Output = B::Output;

    fn name(&self) -> &'static str {
        COMPOSED
    }

    fn run<'a>(
        &'a self,
        exchange: &'a mut Exchange,
        input: In,
    ) -> BoxFuture<'a, Result<Self::Output, ApiError>> {
        async move {
            trace_step(self.first.name());
            let intermediate = self.first.run(exchange, input).await?;
            trace_step(self.second.name());
            self.second.run(exchange, intermediate).await
        }
        .boxed()
    }
}

fn trace_step(name: &'static str) {
    if name != COMPOSED {
        tracing::debug!(step = name, "Running pipeline step");
    }
}

/// Composition helpers for every [`Step`]
pub trait StepExt<In: Send + 'static>: Step<In> + Sized {
    /// Run `next` on this step's output
    fn then<B>(self, next: B) -> Then<Self, B>
    where
        B: Step<Self::Output>,
    {
        Then {
            first: self,
            second: next,
        }
    }
}

impl<In: Send + 'static, S: Step<In>> StepExt<In> for S {}

/// A named, shareable chain of steps
pub struct Pipeline<In, Out> {
    name: &'static str,
    step: Arc<dyn Step<In, Output = Out>>,
}

impl<In, Out> Clone for Pipeline<In, Out> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            step: Arc::clone(&self.step),
        }
    }
}

impl<In, Out> std::fmt::Debug for Pipeline<In, Out> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline").field("name", &self.name).finish()
    }
}

impl<In, Out> Pipeline<In, Out>
where
    In: Send + 'static,
    Out: Send + 'static,
{
    /// Wrap a composed step
    pub fn new<S>(name: &'static str, step: S) -> Self
    where
        S: Step<In, Output = Out>,
    {
        Self {
            name,
            step: Arc::new(step),
        }
    }

    /// Pipeline name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Run every step inside a `pipeline` span
    pub async fn run(&self, exchange: &mut Exchange, input: In) -> Result<Out, ApiError> {
        let span = tracing::debug_span!(
            "pipeline",
            pipeline = self.name,
            method = %exchange.request.method,
            path = %exchange.request.path(),
        );

        async {
            trace_step(self.step.name());
            let result = self.step.run(exchange, input).await;
            if let Err(error) = &result {
                tracing::debug!(kind = %error.kind, "Pipeline aborted");
            }
            result
        }
        .instrument(span)
        .await
    }
}
