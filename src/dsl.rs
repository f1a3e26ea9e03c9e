//! Declarative clause DSL that desugars into [`Flow`] programs.
//!
//! A `handler(...)` call gathers clauses into one flow step: it installs
//! the left-to-right or-else of every clause's command handler, then waits
//! on the left-to-right or-else of every clause's event matcher. Clauses
//! read top to bottom:
//!
//! ```text
//! handler(vec![
//!     when(select).guard(pred, msg).emit_event(build).switch(matcher),
//!     when(select).emit(literals).stay(),
//!     any_other().fail_with(msg),
//! ])
//! ```
//!
//! `when`'s selector plays the role of a runtime-kind match plus optional
//! predicate: it extracts the clause's working value from commands it
//! applies to and rejects the rest. Only the first matching clause in
//! declaration order handles a command; the same first-match rule applies
//! to event matchers at the wait point.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::flow::{CommandHandler, EventMatcher, Flow};

type Select<C, A> = Arc<dyn Fn(&C) -> Option<A> + Send + Sync>;
type GuardFn<A> = Arc<dyn Fn(&A) -> bool + Send + Sync>;
type EmitFn<A, E> = Arc<dyn Fn(&A) -> Vec<E> + Send + Sync>;
type SwitchFn<C, E> = Arc<dyn Fn(&E) -> Option<Flow<C, E>> + Send + Sync>;

/// Start a clause from a command selector.
///
/// The selector is a partial function: it returns `Some(value)` for
/// commands this clause applies to, extracting whatever the guards and
/// emit action need, and `None` for everything else.
pub fn when<C, E, A, F>(select: F) -> When<C, E, A>
where
    F: Fn(&C) -> Option<A> + Send + Sync + 'static,
{
    When {
        select: Arc::new(select),
        guards: Vec::new(),
        _events: PhantomData,
    }
}

/// A clause with a selector and accumulated guards, awaiting its emit
/// action.
pub struct When<C, E, A> {
    select: Select<C, A>,
    guards: Vec<(GuardFn<A>, String)>,
    _events: PhantomData<fn() -> E>,
}

impl<C, E, A> When<C, E, A>
where
    C: 'static,
    E: 'static,
    A: 'static,
{
    /// Add a guard.
    ///
    /// Guards run in declared order at command time. Every failing guard
    /// contributes its message; when any fail, the command is rejected
    /// with the full list and the emit action does not run.
    pub fn guard<P>(mut self, predicate: P, message: impl Into<String>) -> Self
    where
        P: Fn(&A) -> bool + Send + Sync + 'static,
    {
        self.guards.push((Arc::new(predicate), message.into()));
        self
    }

    /// Emit the given literal events.
    pub fn emit(self, events: Vec<E>) -> Emit<C, E, A>
    where
        E: Clone + Send + Sync,
    {
        self.with_emit(Arc::new(move |_| events.clone()))
    }

    /// Emit one event built from the selected value.
    pub fn emit_event<F>(self, build: F) -> Emit<C, E, A>
    where
        F: Fn(&A) -> E + Send + Sync + 'static,
    {
        self.with_emit(Arc::new(move |value| vec![build(value)]))
    }

    /// Emit a list of events built from the selected value.
    pub fn emit_events<F>(self, build: F) -> Emit<C, E, A>
    where
        F: Fn(&A) -> Vec<E> + Send + Sync + 'static,
    {
        self.with_emit(Arc::new(build))
    }

    /// Emit the selected value promoted into an event.
    ///
    /// The structural copy is the author-supplied `Into` conversion, so a
    /// command that cannot be promoted is rejected when the clause is
    /// written, not when it runs.
    pub fn emit_promoted(self) -> Emit<C, E, A>
    where
        A: Clone + Into<E> + Send + Sync,
    {
        self.with_emit(Arc::new(|value: &A| vec![value.clone().into()]))
    }

    fn with_emit(self, emit: EmitFn<A, E>) -> Emit<C, E, A> {
        Emit {
            select: self.select,
            guards: self.guards,
            emit,
        }
    }
}

/// A clause with its emit action, awaiting `switch` or `stay`.
pub struct Emit<C, E, A> {
    select: Select<C, A>,
    guards: Vec<(GuardFn<A>, String)>,
    emit: EmitFn<A, E>,
}

impl<C, E, A> Emit<C, E, A>
where
    C: 'static,
    E: 'static,
    A: 'static,
{
    /// Advance the flow when the matcher recognizes an accepted event.
    ///
    /// The matcher fuses event recognition with the continuation: it
    /// returns the rest of the flow for events this clause switches on,
    /// and `None` for everything else.
    pub fn switch<M>(self, matcher: M) -> Clause<C, E>
    where
        M: Fn(&E) -> Option<Flow<C, E>> + Send + Sync + 'static,
    {
        self.into_clause(Some(Arc::new(matcher)))
    }

    /// Finish the clause without advancing the flow on any event.
    pub fn stay(self) -> Clause<C, E> {
        self.into_clause(None)
    }

    fn into_clause(self, switch: Option<SwitchFn<C, E>>) -> Clause<C, E> {
        let Emit {
            select,
            guards,
            emit,
        } = self;
        let command: CommandHandler<C, E> = Arc::new(move |cmd| {
            let value = select(cmd)?;
            let failures: Vec<String> = guards
                .iter()
                .filter(|(predicate, _)| !predicate(&value))
                .map(|(_, message)| message.clone())
                .collect();
            Some(if failures.is_empty() {
                Ok(emit(&value))
            } else {
                Err(failures)
            })
        });
        Clause { command, switch }
    }
}

/// Start a catch-all clause.
pub fn any_other() -> AnyOther {
    AnyOther
}

/// Builder for the catch-all clause.
pub struct AnyOther;

impl AnyOther {
    /// Unconditionally fail any command that reaches this clause.
    pub fn fail_with<C: 'static, E: 'static>(self, message: impl Into<String>) -> Clause<C, E> {
        let message = message.into();
        Clause {
            command: Arc::new(move |_| Some(Err(vec![message.clone()]))),
            switch: None,
        }
    }
}

/// One finished clause: a command handler and an optional event matcher.
pub struct Clause<C, E> {
    command: CommandHandler<C, E>,
    switch: Option<SwitchFn<C, E>>,
}

/// Desugar a list of clauses into one flow step.
///
/// Installs the or-else of the clauses' command handlers, then waits on
/// the or-else of their event matchers. Both compositions are left-biased:
/// the first clause that applies wins, later clauses are ignored for that
/// command or event. A step whose clauses all `stay` never advances.
pub fn handler<C: 'static, E: 'static>(clauses: Vec<Clause<C, E>>) -> Flow<C, E> {
    let mut commands: Vec<CommandHandler<C, E>> = Vec::with_capacity(clauses.len());
    let mut matchers: Vec<SwitchFn<C, E>> = Vec::new();
    for clause in clauses {
        commands.push(clause.command);
        if let Some(matcher) = clause.switch {
            matchers.push(matcher);
        }
    }

    let command: CommandHandler<C, E> =
        Arc::new(move |cmd| commands.iter().find_map(|handle| handle(cmd)));
    let matcher: EventMatcher<C, E> =
        Arc::new(move |event| matchers.iter().find_map(|matches| matches(event)));

    Flow::install(command, Flow::WaitFor(matcher))
}
