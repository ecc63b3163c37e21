//! Middleware pipeline contract.
//!
//! A pipeline is an ordered list of steps; each step receives the [`Context`]
//! and a continuation. Invoking the continuation runs the remainder of the
//! chain and finally the route handler; returning without invoking it
//! short-circuits. [`Next::run`] takes the continuation by value, so a step
//! cannot invoke it twice.

use crate::{context::Context, errors::RegistryError};
use std::sync::Arc;

/// Failure type surfaced by handlers and pipeline steps.
///
/// Anything convertible with `?` works; the driver logs it and answers with
/// the canned 500 response.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub(crate) type HandlerFn =
    dyn Fn(&mut Context<'_>) -> Result<(), HandlerError> + Send + Sync;

/// A composable unit running before the route handler.
pub trait Middleware: Send + Sync {
    fn handle(&self, ctx: &mut Context<'_>, next: Next<'_>) -> Result<(), HandlerError>;
}

impl<F> Middleware for F
where
    F: Fn(&mut Context<'_>, Next<'_>) -> Result<(), HandlerError> + Send + Sync,
{
    fn handle(&self, ctx: &mut Context<'_>, next: Next<'_>) -> Result<(), HandlerError> {
        self(ctx, next)
    }
}

/// Opaque continuation representing the rest of the pipeline.
pub struct Next<'p> {
    steps: &'p [Arc<dyn Middleware>],
    handler: &'p HandlerFn,
}

impl<'p> Next<'p> {
    /// Runs the remaining steps and then the route handler.
    pub fn run(self, ctx: &mut Context<'_>) -> Result<(), HandlerError> {
        match self.steps.split_first() {
            Some((step, rest)) => step.handle(
                ctx,
                Next {
                    steps: rest,
                    handler: self.handler,
                },
            ),
            None => (self.handler)(ctx),
        }
    }
}

/// Ordered middleware chain with a registration ceiling.
pub(crate) struct Pipeline {
    steps: Vec<Arc<dyn Middleware>>,
    max_steps: usize,
}

impl Pipeline {
    pub(crate) fn new(max_steps: usize) -> Self {
        Self {
            steps: Vec::new(),
            max_steps,
        }
    }

    pub(crate) fn add(
        &mut self,
        step: impl Middleware + 'static,
    ) -> Result<(), RegistryError> {
        if self.steps.len() == self.max_steps {
            return Err(RegistryError::TooManyMiddlewares(self.max_steps));
        }

        self.steps.push(Arc::new(step));
        Ok(())
    }

    /// Runs the chain in registration order, ending at `handler`.
    pub(crate) fn run(
        &self,
        ctx: &mut Context<'_>,
        handler: &HandlerFn,
    ) -> Result<(), HandlerError> {
        Next {
            steps: &self.steps,
            handler,
        }
        .run(ctx)
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.steps.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::Config, http::request::Request, http::response::Response};

    fn request() -> Request {
        Request::parse(b"GET / HTTP/1.1\r\n\r\n", &Config::default()).unwrap()
    }

    fn trace_step(tag: &'static str) -> impl Middleware {
        move |ctx: &mut Context<'_>, next: Next<'_>| {
            let seen = ctx.state("trace").unwrap_or("").to_owned();
            ctx.set_state("trace", format!("{seen}{tag}>"));
            next.run(ctx)
        }
    }

    #[test]
    fn steps_run_in_registration_order() {
        let mut pipeline = Pipeline::new(8);
        pipeline.add(trace_step("one")).unwrap();
        pipeline.add(trace_step("two")).unwrap();

        let request = request();
        let mut response = Response::new();
        let mut ctx = Context::new(&request, &mut response);

        pipeline
            .run(&mut ctx, &|ctx: &mut Context<'_>| {
                let seen = ctx.state("trace").unwrap_or("").to_owned();
                ctx.set_state("trace", format!("{seen}handler"));
                Ok(())
            })
            .unwrap();

        assert_eq!(ctx.state("trace"), Some("one>two>handler"));
    }

    #[test]
    fn short_circuit_skips_the_rest() {
        let mut pipeline = Pipeline::new(8);
        pipeline
            .add(|ctx: &mut Context<'_>, _next: Next<'_>| {
                ctx.set_state("stopped", "yes");
                Ok(())
            })
            .unwrap();
        pipeline.add(trace_step("unreachable")).unwrap();

        let request = request();
        let mut response = Response::new();
        let mut ctx = Context::new(&request, &mut response);

        pipeline
            .run(&mut ctx, &|ctx: &mut Context<'_>| {
                ctx.set_state("handler", "ran");
                Ok(())
            })
            .unwrap();

        assert_eq!(ctx.state("stopped"), Some("yes"));
        assert_eq!(ctx.state("trace"), None);
        assert_eq!(ctx.state("handler"), None);
    }

    #[test]
    fn failure_propagates() {
        let mut pipeline = Pipeline::new(8);
        pipeline
            .add(|_: &mut Context<'_>, _: Next<'_>| Err("denied".into()))
            .unwrap();
        pipeline.add(trace_step("after")).unwrap();

        let request = request();
        let mut response = Response::new();
        let mut ctx = Context::new(&request, &mut response);

        let result = pipeline.run(&mut ctx, &|_: &mut Context<'_>| Ok(()));
        assert_eq!(result.unwrap_err().to_string(), "denied");
        assert_eq!(ctx.state("trace"), None);
    }

    #[test]
    fn registration_ceiling() {
        let mut pipeline = Pipeline::new(1);
        pipeline.add(trace_step("only")).unwrap();

        assert_eq!(
            pipeline.add(trace_step("extra")).unwrap_err(),
            RegistryError::TooManyMiddlewares(1)
        );
        assert_eq!(pipeline.len(), 1);
    }
}
