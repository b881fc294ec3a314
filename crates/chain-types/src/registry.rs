//! Registry trait for self-registering implementations.

/// Ties a configuration name to the factory that builds an implementation.
///
/// Every pluggable backend (state stores, chain adapters) exposes a
/// zero-sized `Registry` type implementing this trait, and its parent crate
/// collects them in a `get_all_implementations()` list. A config section
/// such as `[storage.implementations.file]` is resolved by matching its key
/// against [`ImplementationRegistry::NAME`].
pub trait ImplementationRegistry {
	/// Key used in TOML configuration, e.g. `"file"` or `"evm"`.
	const NAME: &'static str;

	/// Factory signature defined by the parent crate.
	type Factory;

	fn factory() -> Self::Factory;
}
