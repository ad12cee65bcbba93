/// Type-state markers for the builder pattern
///
/// These types track at compile time whether a connection config has been
/// supplied, so `build()` is only callable once it has.

/// Marker trait for config state
pub trait ConfigState {}

/// Config has not been set
pub struct NoConfig;
impl ConfigState for NoConfig {}

/// Config has been set
pub struct HasConfig;
impl ConfigState for HasConfig {}
