//! Entry factories
//!
//! The ring buffer calls its factory exactly once per slot at construction.
//! After that the entries are reused in place and never reallocated.

/// Factory for the reusable entries of a ring buffer
///
/// # Examples
/// ```
/// use batchring::disruptor::EntryFactory;
///
/// struct PriceEntry {
///     price: i64,
/// }
///
/// struct PriceEntryFactory;
///
/// impl EntryFactory<PriceEntry> for PriceEntryFactory {
///     fn create(&self) -> PriceEntry {
///         PriceEntry { price: 0 }
///     }
/// }
/// ```
pub trait EntryFactory<T> {
    /// Create one entry in its initial state
    fn create(&self) -> T;
}

/// Factory for entries that implement `Default`
pub struct DefaultEntryFactory<T: Default> {
    _phantom: std::marker::PhantomData<fn() -> T>,
}

impl<T: Default> DefaultEntryFactory<T> {
    /// Create a new default entry factory
    pub fn new() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<T: Default> Default for DefaultEntryFactory<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Default> EntryFactory<T> for DefaultEntryFactory<T> {
    fn create(&self) -> T {
        T::default()
    }
}

/// Factory that builds entries with a closure
pub struct ClosureEntryFactory<F> {
    factory_fn: F,
}

impl<F> ClosureEntryFactory<F> {
    /// Create a new closure-based entry factory
    pub fn new(factory_fn: F) -> Self {
        Self { factory_fn }
    }
}

impl<T, F> EntryFactory<T> for ClosureEntryFactory<F>
where
    F: Fn() -> T,
{
    fn create(&self) -> T {
        (self.factory_fn)()
    }
}

/// Shorthand for [`ClosureEntryFactory::new`]
///
/// # Examples
/// ```
/// use batchring::disruptor::{entry_factory, EntryFactory};
///
/// let factory = entry_factory(|| 42_i64);
/// assert_eq!(factory.create(), 42);
/// ```
pub fn entry_factory<T, F>(factory_fn: F) -> ClosureEntryFactory<F>
where
    F: Fn() -> T,
{
    ClosureEntryFactory::new(factory_fn)
}
