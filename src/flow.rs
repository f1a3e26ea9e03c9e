//! Flow programs and their compilation into stream consumers.
//!
//! A flow describes an aggregate's behaviour as a free program with two
//! primitive operations: *install a command handler* and *wait for an
//! event*. Compiling a flow produces a [`StreamConsumer`] -- a lazy state
//! machine that holds the command handler currently in force and advances
//! one step per accepted event. The aggregate runtime replays a persisted
//! stream through the consumer to rebuild the aggregate's position, then
//! matches new commands against the consumer's handler.
//!
//! Handlers and matchers are partial functions, represented as
//! `Fn(&X) -> Option<Y>` and composed left-biased.

use std::sync::Arc;

/// Outcome of a matched command: the events to append, or the full list
/// of guard failure messages. The success list may be empty (a no-op
/// command).
pub type HandlerResult<E> = Result<Vec<E>, Vec<String>>;

/// Partial function from command to outcome.
///
/// `None` means the handler does not apply to this command; the runtime
/// reports that as "cannot find handler".
pub type CommandHandler<C, E> = Arc<dyn Fn(&C) -> Option<HandlerResult<E>> + Send + Sync>;

/// Partial function from event to the remainder of the flow.
///
/// `None` means the event is not recognized at this wait point; the
/// consumer stays where it is.
pub type EventMatcher<C, E> = Arc<dyn Fn(&E) -> Option<Flow<C, E>> + Send + Sync>;

/// A flow program node.
///
/// Continuations are fused into the nodes: a wait point's matcher returns
/// the rest of the program for the event that resumed it, so looping
/// behaviours are expressed by functions that rebuild their own flow.
pub enum Flow<C, E> {
    /// Set the command handler in force, then continue.
    ///
    /// The handler remains in force across every wait point reached
    /// before the next `Install`.
    Install(CommandHandler<C, E>, Box<Flow<C, E>>),

    /// Suspend until the matcher recognizes an event, then continue with
    /// the flow it returns.
    WaitFor(EventMatcher<C, E>),

    /// Program end. The aggregate accepts no further commands or events.
    End,
}

impl<C: 'static, E: 'static> Flow<C, E> {
    /// Build an `Install` node.
    pub fn install(handler: CommandHandler<C, E>, next: Flow<C, E>) -> Self {
        Flow::Install(handler, Box::new(next))
    }

    /// Build a `WaitFor` node from a matcher closure.
    pub fn wait_for<M>(matcher: M) -> Self
    where
        M: Fn(&E) -> Option<Flow<C, E>> + Send + Sync + 'static,
    {
        Flow::WaitFor(Arc::new(matcher))
    }

    /// Build the terminal node.
    pub fn end() -> Self {
        Flow::End
    }

    /// Monadic sequencing: run `self` to completion, then continue with
    /// `next()`.
    ///
    /// Every `End` leaf of `self` -- including those reached through wait
    /// continuations -- is replaced by the flow `next` produces.
    pub fn then<F>(self, next: F) -> Self
    where
        F: Fn() -> Flow<C, E> + Send + Sync + 'static,
    {
        self.then_shared(Arc::new(next))
    }

    fn then_shared(self, next: Arc<dyn Fn() -> Flow<C, E> + Send + Sync>) -> Self {
        match self {
            Flow::Install(handler, rest) => {
                Flow::Install(handler, Box::new(rest.then_shared(next)))
            }
            Flow::WaitFor(matcher) => Flow::WaitFor(Arc::new(move |event| {
                matcher(event).map(|flow| flow.then_shared(Arc::clone(&next)))
            })),
            Flow::End => next(),
        }
    }
}

/// A command handler that matches nothing.
///
/// This is the handler in force before a flow's first `Install` node.
pub fn empty_handler<C: 'static, E: 'static>() -> CommandHandler<C, E> {
    Arc::new(|_| None)
}

/// Compile a flow into its first wait point.
///
/// Walks `Install` nodes, carrying the most recently installed handler,
/// until a `WaitFor` node is reached; that handler and matcher become the
/// consumer. Returns `None` when the program ends without waiting -- a
/// terminal flow.
pub fn compile<C: 'static, E: 'static>(
    handler: CommandHandler<C, E>,
    flow: Flow<C, E>,
) -> Option<StreamConsumer<C, E>> {
    match flow {
        Flow::Install(installed, next) => compile(installed, *next),
        Flow::WaitFor(matcher) => Some(StreamConsumer { handler, matcher }),
        Flow::End => None,
    }
}

/// The compiled state of a flow at one wait point during event replay.
///
/// An immutable value: stepping produces a new consumer (or the same one,
/// cheaply shared, when the event does not match). The handler installed
/// at suspension time stays in force while suspended, so an aggregate
/// never loses its handler because an unrelated event was observed.
pub struct StreamConsumer<C, E> {
    pub(crate) handler: CommandHandler<C, E>,
    pub(crate) matcher: EventMatcher<C, E>,
}

impl<C, E> Clone for StreamConsumer<C, E> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
            matcher: Arc::clone(&self.matcher),
        }
    }
}

impl<C: 'static, E: 'static> StreamConsumer<C, E> {
    /// Match a command against the handler currently in force.
    ///
    /// Returns `None` when no clause matches.
    pub fn handle_command(&self, command: &C) -> Option<HandlerResult<E>> {
        (self.handler)(command)
    }

    /// Advance the consumer by one observed event.
    ///
    /// - The event does not match: returns the same consumer (same
    ///   handler, same future stepping behaviour).
    /// - The event matches: compiles the continuation, re-using the
    ///   handler in force until the continuation installs its own.
    /// - The continuation reaches program end: returns `None`; the flow
    ///   has terminated.
    pub fn step_on_event(&self, event: &E) -> Option<StreamConsumer<C, E>> {
        match (self.matcher)(event) {
            Some(next) => {
                let compiled = compile(Arc::clone(&self.handler), next);
                if compiled.is_none() {
                    tracing::debug!("flow reached its end, consumer terminates");
                }
                compiled
            }
            None => Some(self.clone()),
        }
    }
}
