//! Page processors
//!
//! A processor is the caller-supplied function every consumer applies to the
//! pages it dequeues. Processors must be safe to call from many consumers at
//! once; any shared state they touch (a [`SharedCounter`], an output sink)
//! must be internally synchronized.

use crate::store::Page;
use crate::traverse::counter::SharedCounter;
use async_trait::async_trait;
use std::future::Future;
use std::marker::PhantomData;
use tracing::trace;

/// Function applied to every dequeued page
///
/// Returning an error drops the page: it is logged, counted and never
/// retried or requeued.
#[async_trait]
pub trait PageProcessor: Send + Sync {
    /// Process one page
    async fn process(&self, page: &Page) -> anyhow::Result<()>;
}

/// Adapter turning an async closure plus ancillary arguments into a processor
///
/// `args` is cloned into every call, so handles such as [`SharedCounter`]
/// are shared across all consumers.
pub struct FnProcessor<F, A, Fut> {
    func: F,
    args: A,
    _fut: PhantomData<fn() -> Fut>,
}

/// Build a processor from `func(page, args)`
///
/// ```no_run
/// use table_traverse::traverse::{processor_fn, SharedCounter};
///
/// let counter = SharedCounter::new();
/// let processor = processor_fn(
///     |page, counter: SharedCounter| async move {
///         counter.add(page.count as i64);
///         Ok::<_, anyhow::Error>(())
///     },
///     counter.clone(),
/// );
/// ```
pub fn processor_fn<F, A, Fut>(func: F, args: A) -> FnProcessor<F, A, Fut>
where
    F: Fn(Page, A) -> Fut + Send + Sync,
    A: Clone + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    FnProcessor {
        func,
        args,
        _fut: PhantomData,
    }
}

#[async_trait]
impl<F, A, Fut> PageProcessor for FnProcessor<F, A, Fut>
where
    F: Fn(Page, A) -> Fut + Send + Sync,
    A: Clone + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn process(&self, page: &Page) -> anyhow::Result<()> {
        (self.func)(page.clone(), self.args.clone()).await
    }
}

/// Counts every item it sees into a shared counter
#[derive(Debug, Clone, Default)]
pub struct Cardinality {
    counter: SharedCounter,
}

impl Cardinality {
    /// Count into `counter`
    pub fn new(counter: SharedCounter) -> Self {
        Self { counter }
    }

    /// The counter being incremented
    pub fn counter(&self) -> &SharedCounter {
        &self.counter
    }
}

#[async_trait]
impl PageProcessor for Cardinality {
    async fn process(&self, page: &Page) -> anyhow::Result<()> {
        for _ in &page.items {
            let total = self.counter.increment();
            trace!(segment = page.segment, total, "Current total");
        }
        Ok(())
    }
}
