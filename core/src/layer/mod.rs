//! Layer selection: identifier resolution and the layer factory

mod factory;
mod resolver;

pub use factory::{ClientConstructor, Layer, LayerRegistry, ServerConstructor, get_layer};
pub use resolver::{DEFAULT_BASE, NAMESPACE_SEPARATOR, Resolver};
