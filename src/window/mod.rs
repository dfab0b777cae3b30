//! Windowing adapter — the narrow slice of the window system the focus
//! tracker needs.
//!
//! The tracker only ever reads two kinds of property (the root window's
//! active-window pointer and a window's name), toggles property-change
//! subscriptions on individual windows, and blocks for the next event.
//! `X11Windows` is the production adapter; tests drive the tracker through
//! an in-memory implementation of `WindowSystem`.

pub mod x11;

pub use x11::X11Windows;

/// Opaque identifier of a top-level window (an X11 XID).
pub type WindowId = u32;

/// Errors returned by windowing adapters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WindowError {
    /// The window was destroyed between being named and being queried.
    ///
    /// Expected whenever windows close; callers swallow it at the point
    /// of use.
    #[error("window 0x{0:x} no longer exists")]
    Gone(WindowId),

    /// Any other failure from the window system (connection lost,
    /// protocol error, bad atom).
    #[error("X11: {0}")]
    X11(String),
}

/// Which window-name property to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NameProperty {
    /// `_NET_WM_NAME`, always UTF-8.
    NetWmName,
    /// `WM_NAME`, legacy encoding.
    WmName,
}

/// A property the tracker cares about, decoded from its atom.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Property {
    /// `_NET_ACTIVE_WINDOW` on the root window.
    ActiveWindow,
    /// One of the window-name properties.
    Name(NameProperty),
    /// Any other atom (raw value kept for logging).
    Other(u32),
}

/// A window-system event, reduced to what the tracker dispatches on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowEvent {
    /// A watched window's property was changed or deleted.
    PropertyChanged {
        window: WindowId,
        property: Property,
    },
    /// The pointer moved; root-relative coordinates.
    PointerMotion { x: i16, y: i16 },
    /// Anything else, described for diagnostics.
    Other(String),
}

/// What an injected error handler decided to do with a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorDisposition {
    /// Log and carry on.
    Ignore,
    /// Propagate the error to the caller.
    Fatal,
}

/// Decides how non-benign window-system failures are treated.
///
/// Injected into the adapter at construction.
pub type ErrorHandler = Box<dyn Fn(&WindowError) -> ErrorDisposition>;

/// Handler that escalates every failure.
pub fn fatal_errors() -> ErrorHandler {
    Box::new(|_| ErrorDisposition::Fatal)
}

/// Handler that logs every failure and keeps going.
pub fn tolerate_errors() -> ErrorHandler {
    Box::new(|err| {
        tracing::warn!(error = %err, "ignoring window system error");
        ErrorDisposition::Ignore
    })
}

/// Window-system operations consumed by the focus tracker.
pub trait WindowSystem {
    /// Read the root window's active-window property.
    ///
    /// `Ok(None)` when the property is unset or names no window.
    fn active_window(&self) -> Result<Option<WindowId>, WindowError>;

    /// Read a name property of `window` as raw bytes.
    ///
    /// `Ok(None)` when the property is unset.
    fn window_name(
        &self,
        window: WindowId,
        property: NameProperty,
    ) -> Result<Option<Vec<u8>>, WindowError>;

    /// Subscribe to property-change notifications on `window`.
    fn watch(&self, window: WindowId) -> Result<(), WindowError>;

    /// Cancel property-change notifications on `window`.
    fn unwatch(&self, window: WindowId) -> Result<(), WindowError>;

    /// Block until the next event arrives.
    fn next_event(&self) -> Result<WindowEvent, WindowError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_handlers() {
        let err = WindowError::X11("boom".into());
        assert_eq!(fatal_errors()(&err), ErrorDisposition::Fatal);
        assert_eq!(tolerate_errors()(&err), ErrorDisposition::Ignore);
    }

    #[test]
    fn gone_error_names_window_in_hex() {
        assert_eq!(
            WindowError::Gone(0x1c0_0007).to_string(),
            "window 0x1c00007 no longer exists"
        );
    }
}
