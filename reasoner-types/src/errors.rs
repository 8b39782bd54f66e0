pub mod internal {
    use std::error::Error;

    /// Opaque error surfaced by external collaborators (storage traversals,
    /// planners, materialisation). The core forwards these unchanged.
    pub type BoxedError = Box<dyn Error + Send + Sync + 'static>;
}
