//! Presentation state of view-like objects.

/// Presentation state the detector needs from a view or view controller.
///
/// Controllers are often reused across present/dismiss cycles, so their
/// deallocation is the wrong signal. A view counts as still presented while it
/// is loaded and attached to a window.
///
/// ```
/// use leakwatch::detector::ViewLifecycle;
/// use std::sync::atomic::{AtomicBool, Ordering};
///
/// struct Screen {
///     loaded: AtomicBool,
///     in_window: AtomicBool,
/// }
///
/// impl ViewLifecycle for Screen {
///     fn is_view_loaded(&self) -> bool {
///         self.loaded.load(Ordering::Acquire)
///     }
///
///     fn is_attached_to_window(&self) -> bool {
///         self.in_window.load(Ordering::Acquire)
///     }
/// }
/// ```
pub trait ViewLifecycle: Send + Sync {
    /// Returns true if the view has been loaded and not unloaded since.
    fn is_view_loaded(&self) -> bool;

    /// Returns true if the view is part of a window's hierarchy.
    fn is_attached_to_window(&self) -> bool;

    /// Returns true if the view is still on screen.
    fn is_presented(&self) -> bool {
        self.is_view_loaded() && self.is_attached_to_window()
    }
}
