//! Focus/title tracker — follows the active window and its title.
//!
//! Reacts to window-system events and keeps a `FocusState` current,
//! invoking the change handler exactly once per externally visible
//! change. The state lives in the `Tracker`, which the event loop owns;
//! there is a single writer and no shared state.

use crate::window::{
    ErrorHandler, NameProperty, Property, WindowError, WindowEvent, WindowId, WindowSystem,
    X11Windows,
};

/// Title reported when a name property holds bytes that are not UTF-8.
pub const UNDECODABLE_TITLE: &str = "<undecodable title>";

/// Tracker errors.
#[derive(Debug, thiserror::Error)]
pub enum TrackError {
    #[error("window system: {0}")]
    Window(#[from] WindowError),
}

/// The currently focused window and its title.
///
/// `title` is only meaningful relative to `active_window`; it is
/// re-resolved whenever the window changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FocusState {
    pub active_window: Option<WindowId>,
    pub title: Option<String>,
}

/// Called with the new state after every change.
pub type ChangeHandler = Box<dyn FnMut(&FocusState)>;

/// Called with root-relative coordinates on pointer motion.
pub type MotionHandler = Box<dyn FnMut(i16, i16)>;

/// Follows focus and title changes reported by a `WindowSystem`.
pub struct Tracker<W> {
    windows: W,
    state: FocusState,
    on_change: ChangeHandler,
    on_motion: MotionHandler,
}

impl<W: WindowSystem> Tracker<W> {
    /// Create a tracker with the default handlers: print the title on
    /// change, trace pointer motion.
    pub fn new(windows: W) -> Self {
        Self {
            windows,
            state: FocusState::default(),
            on_change: Box::new(print_title),
            on_motion: Box::new(|x, y| tracing::trace!(x, y, "pointer motion")),
        }
    }

    /// Replace the change handler.
    pub fn with_change_handler(mut self, handler: impl FnMut(&FocusState) + 'static) -> Self {
        self.on_change = Box::new(handler);
        self
    }

    /// Replace the pointer-motion handler.
    pub fn with_motion_handler(mut self, handler: impl FnMut(i16, i16) + 'static) -> Self {
        self.on_motion = Box::new(handler);
        self
    }

    /// Resolve the focus once at startup, then handle events until the
    /// window system fails. Only returns on error.
    pub fn run(&mut self) -> Result<(), TrackError> {
        self.prime()?;
        loop {
            let event = self.windows.next_event()?;
            self.handle_event(event)?;
        }
    }

    /// Read the current active window and title, and report them if a
    /// window is focused.
    pub fn prime(&mut self) -> Result<(), TrackError> {
        let (window, changed) = self.active_window()?;
        if changed {
            self.window_name(window)?;
            (self.on_change)(&self.state);
        }
        Ok(())
    }

    /// Re-read the root window's active-window property.
    ///
    /// On a change, moves the property-change subscription from the old
    /// window to the new one and returns `(new, true)`. The previous title
    /// is dropped with the previous window. An unset property leaves the
    /// state alone and returns `(None, false)`.
    pub fn active_window(&mut self) -> Result<(Option<WindowId>, bool), TrackError> {
        let Some(window) = self.windows.active_window()? else {
            return Ok((None, false));
        };

        if self.state.active_window == Some(window) {
            return Ok((Some(window), false));
        }

        if let Some(previous) = self.state.active_window {
            tolerate_gone(self.windows.unwatch(previous))?;
        }
        tolerate_gone(self.windows.watch(window))?;

        tracing::debug!(window = format_args!("0x{window:x}"), "active window changed");
        self.state.active_window = Some(window);
        self.state.title = None;
        Ok((Some(window), true))
    }

    /// Resolve the title of `window` and record it.
    ///
    /// `None` clears the title and always counts as a change. A window
    /// that vanished mid-query leaves the title as it was.
    pub fn window_name(
        &mut self,
        window: Option<WindowId>,
    ) -> Result<(Option<String>, bool), TrackError> {
        let Some(window) = window else {
            self.state.title = None;
            return Ok((None, true));
        };

        let title = match self.resolve_name(window) {
            Ok(title) => title,
            Err(WindowError::Gone(w)) => {
                tracing::debug!(
                    window = format_args!("0x{w:x}"),
                    "window closed during name lookup"
                );
                return Ok((self.state.title.clone(), false));
            }
            Err(e) => return Err(e.into()),
        };

        let changed = self.state.title.as_deref() != Some(title.as_str());
        self.state.title = Some(title);
        Ok((self.state.title.clone(), changed))
    }

    /// Dispatch one event. Returns whether the state changed.
    pub fn handle_event(&mut self, event: WindowEvent) -> Result<bool, TrackError> {
        let changed = match event {
            WindowEvent::PointerMotion { x, y } => {
                (self.on_motion)(x, y);
                return Ok(false);
            }
            WindowEvent::Other(description) => {
                tracing::debug!(event = %description, "ignoring event");
                return Ok(false);
            }
            WindowEvent::PropertyChanged { window, property } => match property {
                Property::ActiveWindow => {
                    let (window, changed) = self.active_window()?;
                    if changed {
                        self.window_name(window)?;
                    }
                    changed
                }
                Property::Name(_) => {
                    let window = self.state.active_window;
                    self.window_name(window)?.1
                }
                Property::Other(atom) => {
                    tracing::trace!(
                        window = format_args!("0x{window:x}"),
                        atom,
                        "ignoring property change"
                    );
                    false
                }
            },
        };

        if changed {
            (self.on_change)(&self.state);
        }
        Ok(changed)
    }

    /// First non-empty name property wins; `_NET_WM_NAME` before `WM_NAME`.
    fn resolve_name(&self, window: WindowId) -> Result<String, WindowError> {
        for property in [NameProperty::NetWmName, NameProperty::WmName] {
            if let Some(bytes) = self.windows.window_name(window, property)?
                && !bytes.is_empty()
            {
                return Ok(decode_title(bytes));
            }
        }
        Ok(unnamed_title(window))
    }
}

/// `tail`: connect to the X11 display and follow focus until the
/// connection fails.
///
/// `with_id` prefixes each title with the window id; `show_motion`
/// also prints pointer positions.
pub fn run(on_error: ErrorHandler, with_id: bool, show_motion: bool) -> Result<(), TrackError> {
    let windows = X11Windows::connect(on_error)?;
    let (width, height) = windows.screen_size();
    tracing::info!(width, height, "tracking focus");

    let mut tracker = Tracker::new(windows);
    if with_id {
        tracker = tracker.with_change_handler(print_id_and_title);
    }
    if show_motion {
        tracker = tracker.with_motion_handler(|x, y| println!("motion {x},{y}"));
    }
    tracker.run()
}

fn tolerate_gone(result: Result<(), WindowError>) -> Result<(), WindowError> {
    match result {
        Err(WindowError::Gone(window)) => {
            tracing::debug!(window = format_args!("0x{window:x}"), "window already closed");
            Ok(())
        }
        other => other,
    }
}

fn decode_title(bytes: Vec<u8>) -> String {
    String::from_utf8(bytes).unwrap_or_else(|_| UNDECODABLE_TITLE.to_string())
}

/// Placeholder title for a window with no name, carrying its id.
fn unnamed_title(window: WindowId) -> String {
    format!("<unnamed window 0x{window:x}>")
}

fn print_title(state: &FocusState) {
    if let Some(title) = &state.title {
        println!("{title}");
    }
}

fn print_id_and_title(state: &FocusState) {
    if let (Some(window), Some(title)) = (state.active_window, &state.title) {
        println!("0x{window:08x} {title}");
    }
}
