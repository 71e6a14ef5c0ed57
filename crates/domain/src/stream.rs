use std::pin::Pin;

/// A boxed async stream, used for generator delta and synthesizer chunk
/// streams.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;
