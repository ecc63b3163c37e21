//! Path-pattern registry and matcher.
//!
//! Pattern grammar, per `/`-separated segment:
//! - a literal segment matches exactly (case-sensitive) against the decoded
//!   path segment,
//! - `:name` matches any nonempty decoded segment and captures it,
//! - `*` matches the current and all remaining segments and stops matching.
//!
//! Routes are tried in registration order and the first match wins, so more
//! specific patterns must be registered before less specific ones: a literal
//! route added after `/:id` on the same method will never match.

use crate::{
    context::Context,
    errors::RegistryError,
    http::{codec, types::Method},
    pipeline::{HandlerError, HandlerFn, Pipeline},
};

pub(crate) type BoxedHandler = Box<HandlerFn>;

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Param(String),
    Wildcard,
}

struct Route {
    method: Method,
    pattern: String,
    segments: Vec<Segment>,
    has_dynamic: bool,
    handler: BoxedHandler,
}

/// Failure modes of [`Router::dispatch`].
pub(crate) enum DispatchError {
    /// No pattern matched the path under any method.
    NotFound,
    /// A pattern matched the path, but only under a different method.
    MethodNotAllowed,
    /// The pipeline or the route handler failed.
    Handler(HandlerError),
}

/// Route registry with first-match-wins resolution.
///
/// Written only during setup; the server freezes it behind an `Arc` once
/// `listen()` begins.
pub struct Router {
    routes: Vec<Route>,
    max_routes: usize,
    max_params: usize,
}

impl Router {
    pub fn new(max_routes: usize, max_params: usize) -> Self {
        Self {
            routes: Vec::new(),
            max_routes,
            max_params,
        }
    }

    /// Registers `handler` for `method` + `pattern`.
    ///
    /// The pattern string is stored as given and never rewritten.
    pub fn route(
        &mut self,
        method: Method,
        pattern: &str,
        handler: impl Fn(&mut Context<'_>) -> Result<(), HandlerError> + Send + Sync + 'static,
    ) -> Result<(), RegistryError> {
        if self.routes.len() == self.max_routes {
            return Err(RegistryError::TooManyRoutes(self.max_routes));
        }

        let segments = compile_pattern(pattern, self.max_params)?;
        let has_dynamic = segments
            .iter()
            .any(|segment| !matches!(segment, Segment::Literal(_)));

        self.routes.push(Route {
            method,
            pattern: pattern.to_owned(),
            segments,
            has_dynamic,
            handler: Box::new(handler),
        });

        Ok(())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Returns the first registered route matching `method` + `path`.
    fn find_route(&self, method: Method, path: &str) -> Option<&Route> {
        self.routes
            .iter()
            .find(|route| route.method == method && route.matches(path))
    }

    fn path_matches_other_method(&self, method: Method, path: &str) -> bool {
        self.routes
            .iter()
            .any(|route| route.method != method && route.matches(path))
    }

    /// Resolves the request in `ctx`, extracts route parameters and runs the
    /// pipeline followed by the handler.
    pub(crate) fn dispatch(
        &self,
        ctx: &mut Context<'_>,
        pipeline: &Pipeline,
    ) -> Result<(), DispatchError> {
        let method = ctx.request().method();
        let path = ctx.request().path().to_owned();

        let Some(route) = self.find_route(method, &path) else {
            return Err(match self.path_matches_other_method(method, &path) {
                true => DispatchError::MethodNotAllowed,
                false => DispatchError::NotFound,
            });
        };

        if route.has_dynamic {
            let decoded = codec::split_and_decode_path(path.as_bytes());
            for (segment, value) in route.segments.iter().zip(decoded) {
                match segment {
                    Segment::Param(name) => {
                        ctx.insert_param(name.clone(), into_string(value));
                    }
                    Segment::Wildcard => break,
                    Segment::Literal(_) => {}
                }
            }
        }

        pipeline
            .run(ctx, route.handler.as_ref())
            .map_err(DispatchError::Handler)
    }
}

impl Route {
    fn matches(&self, raw_path: &str) -> bool {
        // Fast path: verbatim equality needs no decoding.
        if self.pattern == raw_path {
            return true;
        }
        // A fully literal pattern that failed the fast path cannot match.
        if !self.has_dynamic {
            return false;
        }

        let path = codec::split_and_decode_path(raw_path.as_bytes());
        segments_match(&self.segments, &path)
    }
}

fn segments_match(segments: &[Segment], path: &[Vec<u8>]) -> bool {
    let mut index = 0;

    for segment in segments {
        match segment {
            Segment::Wildcard => return true,
            Segment::Literal(literal) => {
                if index >= path.len() || path[index] != literal.as_bytes() {
                    return false;
                }
            }
            Segment::Param(_) => {
                if index >= path.len() || path[index].is_empty() {
                    return false;
                }
            }
        }
        index += 1;
    }

    index == path.len()
}

fn compile_pattern(pattern: &str, max_params: usize) -> Result<Vec<Segment>, RegistryError> {
    let mut params = 0;

    let segments = pattern
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            if segment == "*" {
                Segment::Wildcard
            } else if let Some(name) = segment.strip_prefix(':') {
                params += 1;
                Segment::Param(name.to_owned())
            } else {
                let decoded = codec::decode_path_component(segment.as_bytes());
                Segment::Literal(into_string(decoded))
            }
        })
        .collect();

    match params > max_params {
        true => Err(RegistryError::TooManyParams(max_params)),
        false => Ok(segments),
    }
}

#[inline]
fn into_string(bytes: Vec<u8>) -> String {
    match simdutf8::basic::from_utf8(&bytes) {
        Ok(text) => text.to_owned(),
        Err(_) => String::from_utf8_lossy(&bytes).into_owned(),
    }
}
