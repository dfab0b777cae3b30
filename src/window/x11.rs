//! X11 windowing adapter — `_NET_ACTIVE_WINDOW` and window-name queries
//! over `x11rb`.
//!
//! Protocol errors are split in two: `BadWindow` means the window closed
//! under us and is reported as `WindowError::Gone`; everything else goes
//! through the injected `ErrorHandler`. Connection failures are always
//! fatal since nothing can be read afterwards.

use x11rb::connection::Connection;
use x11rb::errors::{ConnectionError, ReplyError};
use x11rb::protocol::xproto::{
    self, Atom, AtomEnum, ChangeWindowAttributesAux, EventMask, GetPropertyReply, Window,
};
use x11rb::protocol::{ErrorKind, Event};
use x11rb::rust_connection::RustConnection;
use x11rb::x11_utils::X11Error;

use super::{
    ErrorDisposition, ErrorHandler, NameProperty, Property, WindowError, WindowEvent, WindowId,
    WindowSystem,
};

/// Longest property value read, in 32-bit units.
const MAX_PROPERTY_WORDS: u32 = 1024;

/// Pre-interned atoms for the properties the tracker reads.
struct Atoms {
    net_active_window: Atom,
    net_wm_name: Atom,
    wm_name: Atom,
}

/// X11 implementation of `WindowSystem`.
pub struct X11Windows {
    conn: RustConnection,
    root: Window,
    screen_size: (u16, u16),
    atoms: Atoms,
    on_error: ErrorHandler,
}

impl X11Windows {
    /// Connect to the display named by `$DISPLAY`, intern atoms and
    /// select property-change and pointer-motion events on the root window.
    pub fn connect(on_error: ErrorHandler) -> Result<Self, WindowError> {
        let (conn, screen_num) = RustConnection::connect(None)
            .map_err(|e| WindowError::X11(format!("connect failed: {e}")))?;

        let screen = &conn.setup().roots[screen_num];
        let root = screen.root;
        let screen_size = (screen.width_in_pixels, screen.height_in_pixels);

        let atoms = Atoms {
            net_active_window: intern(&conn, b"_NET_ACTIVE_WINDOW")?,
            net_wm_name: intern(&conn, b"_NET_WM_NAME")?,
            wm_name: AtomEnum::WM_NAME.into(),
        };

        let mask = EventMask::PROPERTY_CHANGE | EventMask::POINTER_MOTION;
        xproto::change_window_attributes(
            &conn,
            root,
            &ChangeWindowAttributesAux::new().event_mask(mask),
        )
        .map_err(connection_error)?
        .check()
        .map_err(|e| WindowError::X11(format!("select root events: {e}")))?;

        tracing::debug!(
            root = format_args!("0x{root:x}"),
            width = screen_size.0,
            height = screen_size.1,
            "connected to X11 display"
        );

        Ok(Self {
            conn,
            root,
            screen_size,
            atoms,
            on_error,
        })
    }

    /// Size of the default screen in pixels, `(width, height)`.
    pub fn screen_size(&self) -> (u16, u16) {
        self.screen_size
    }

    /// Read a property of any type.
    ///
    /// `Ok(None)` if the read failed with a protocol error the handler
    /// chose to ignore.
    fn get_property(
        &self,
        window: Window,
        atom: Atom,
    ) -> Result<Option<GetPropertyReply>, WindowError> {
        let cookie = xproto::get_property(
            &self.conn,
            false,
            window,
            atom,
            AtomEnum::ANY,
            0,
            MAX_PROPERTY_WORDS,
        )
        .map_err(connection_error)?;

        match cookie.reply() {
            Ok(reply) => Ok(Some(reply)),
            Err(ReplyError::X11Error(e)) => {
                self.protocol_error(window, &e)?;
                Ok(None)
            }
            Err(ReplyError::ConnectionError(e)) => Err(connection_error(e)),
        }
    }

    /// Change the event mask of `window`, mapping failures like reads.
    fn select_events(&self, window: Window, mask: EventMask) -> Result<(), WindowError> {
        let cookie = xproto::change_window_attributes(
            &self.conn,
            window,
            &ChangeWindowAttributesAux::new().event_mask(mask),
        )
        .map_err(connection_error)?;

        match cookie.check() {
            Ok(()) => Ok(()),
            Err(ReplyError::X11Error(e)) => self.protocol_error(window, &e),
            Err(ReplyError::ConnectionError(e)) => Err(connection_error(e)),
        }
    }

    /// Route a protocol error: `BadWindow` is a benign race, anything
    /// else is up to the injected handler.
    fn protocol_error(&self, window: Window, err: &X11Error) -> Result<(), WindowError> {
        if err.error_kind == ErrorKind::Window {
            return Err(WindowError::Gone(window));
        }
        self.escalate(WindowError::X11(describe(err)))
    }

    fn escalate(&self, err: WindowError) -> Result<(), WindowError> {
        match (self.on_error)(&err) {
            ErrorDisposition::Ignore => Ok(()),
            ErrorDisposition::Fatal => Err(err),
        }
    }

    fn property(&self, atom: Atom) -> Property {
        if atom == self.atoms.net_active_window {
            Property::ActiveWindow
        } else if atom == self.atoms.net_wm_name {
            Property::Name(NameProperty::NetWmName)
        } else if atom == self.atoms.wm_name {
            Property::Name(NameProperty::WmName)
        } else {
            Property::Other(atom)
        }
    }
}

impl WindowSystem for X11Windows {
    fn active_window(&self) -> Result<Option<WindowId>, WindowError> {
        let Some(reply) = self.get_property(self.root, self.atoms.net_active_window)? else {
            return Ok(None);
        };

        let window = reply.value32().and_then(|mut values| values.next());
        Ok(window.filter(|&w| w != 0))
    }

    fn window_name(
        &self,
        window: WindowId,
        property: NameProperty,
    ) -> Result<Option<Vec<u8>>, WindowError> {
        let atom = match property {
            NameProperty::NetWmName => self.atoms.net_wm_name,
            NameProperty::WmName => self.atoms.wm_name,
        };

        let Some(reply) = self.get_property(window, atom)? else {
            return Ok(None);
        };

        // An unset property comes back with type NONE and no data.
        if reply.type_ == u32::from(AtomEnum::NONE) || reply.value.is_empty() {
            return Ok(None);
        }
        Ok(Some(reply.value))
    }

    fn watch(&self, window: WindowId) -> Result<(), WindowError> {
        self.select_events(window, EventMask::PROPERTY_CHANGE)
    }

    fn unwatch(&self, window: WindowId) -> Result<(), WindowError> {
        self.select_events(window, EventMask::NO_EVENT)
    }

    fn next_event(&self) -> Result<WindowEvent, WindowError> {
        loop {
            let event = self.conn.wait_for_event().map_err(connection_error)?;

            match event {
                Event::PropertyNotify(e) => {
                    return Ok(WindowEvent::PropertyChanged {
                        window: e.window,
                        property: self.property(e.atom),
                    });
                }
                Event::MotionNotify(e) => {
                    return Ok(WindowEvent::PointerMotion {
                        x: e.root_x,
                        y: e.root_y,
                    });
                }
                Event::Error(e) if e.error_kind == ErrorKind::Window => {
                    tracing::debug!(
                        window = format_args!("0x{:x}", e.bad_value),
                        "BadWindow from a closed window"
                    );
                }
                Event::Error(e) => self.escalate(WindowError::X11(describe(&e)))?,
                other => return Ok(WindowEvent::Other(format!("{other:?}"))),
            }
        }
    }
}

fn intern(conn: &RustConnection, name: &[u8]) -> Result<Atom, WindowError> {
    let atom = xproto::intern_atom(conn, false, name)
        .map_err(connection_error)?
        .reply()
        .map_err(|e| WindowError::X11(format!("intern_atom reply: {e}")))?
        .atom;
    Ok(atom)
}

fn connection_error(e: ConnectionError) -> WindowError {
    WindowError::X11(format!("connection: {e}"))
}

fn describe(err: &X11Error) -> String {
    format!(
        "{:?} error (opcode {}.{}, value 0x{:x})",
        err.error_kind, err.major_opcode, err.minor_opcode, err.bad_value
    )
}
