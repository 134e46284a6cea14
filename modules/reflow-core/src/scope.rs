//! Scoped sub-reactors: a child view over a parent core's state and actions.

use futures::future;
use futures::stream::BoxStream;
use futures::StreamExt;

use crate::engine::{Core, Reducer};

/// An explicit adapter deriving a child reactor from a parent core: a mapped
/// read-only state stream plus a forwarder that embeds child actions into the
/// parent's action type.
///
/// The scope holds only a weak send capability, never ownership of the
/// parent loop.
pub struct Scope<T, A> {
    stream: BoxStream<'static, T>,
    forward: Box<dyn Fn(A) + Send + Sync>,
}

impl<T, A> Scope<T, A> {
    /// Forward a child action into the parent loop.
    pub fn send(&self, action: A) {
        (self.forward)(action)
    }

    /// Next projected state, or `None` once the parent is gone.
    pub async fn recv(&mut self) -> Option<T> {
        self.stream.next().await
    }
}

impl<R: Reducer> Core<R> {
    /// Derive a scope over a projection of this core's state.
    pub fn scope<T, A, P, E>(&self, mut project: P, embed: E) -> Scope<T, A>
    where
        T: Send + 'static,
        A: Send + 'static,
        P: FnMut(&R::State) -> T + Send + 'static,
        E: Fn(A) -> R::Action + Send + Sync + 'static,
    {
        let stream = self.cell().subscribe().map(move |s| project(&s)).boxed();
        let sender = self.sender();
        Scope {
            stream,
            forward: Box::new(move |action| sender.send(embed(action))),
        }
    }

    /// Like [`scope`](Self::scope), but the projection is partial: `None`
    /// snapshots are filtered out of the derived stream.
    pub fn compact_scope<T, A, P, E>(&self, mut project: P, embed: E) -> Scope<T, A>
    where
        T: Send + 'static,
        A: Send + 'static,
        P: FnMut(&R::State) -> Option<T> + Send + 'static,
        E: Fn(A) -> R::Action + Send + Sync + 'static,
    {
        let stream = self
            .cell()
            .subscribe()
            .filter_map(move |s| future::ready(project(&s)))
            .boxed();
        let sender = self.sender();
        Scope {
            stream,
            forward: Box::new(move |action| sender.send(embed(action))),
        }
    }
}
