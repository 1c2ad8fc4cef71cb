//! Server-side rendering support.
//!
//! On the server a component tree is set up once, read synchronously into a
//! string and thrown away. Effects exist to keep an environment in sync over
//! time, so while rendering on the server they are created inert: they never
//! run and never subscribe. Signals and memos behave normally.

use std::cell::Cell;

use tracing::debug;

use crate::reactive::{create_root, Scope};

thread_local! {
    static SERVER: Cell<bool> = const { Cell::new(false) };
}

/// Whether the current thread is rendering on the server.
pub fn is_server() -> bool {
    SERVER.try_with(Cell::get).unwrap_or(false)
}

/// Run `render` inside a fresh root scope with server mode on, dispose the
/// root and return the rendered output.
///
/// The root is disposed even if `render` panics.
pub fn render_to_string(render: impl FnOnce() -> String) -> String {
    let _server = ServerGuard::enter();
    debug!("rendering on the server");
    create_root(|root| {
        let _dispose = DisposeOnDrop(root);
        let html = render();
        debug!(bytes = html.len(), "rendered on the server");
        html
    })
}

struct ServerGuard {
    previous: bool,
}

impl ServerGuard {
    fn enter() -> Self {
        Self {
            previous: SERVER.with(|server| server.replace(true)),
        }
    }
}

impl Drop for ServerGuard {
    fn drop(&mut self) {
        let _ = SERVER.try_with(|server| server.set(self.previous));
    }
}

struct DisposeOnDrop(Scope);

impl Drop for DisposeOnDrop {
    fn drop(&mut self) {
        self.0.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{on_cleanup, Effect, Memo, Signal};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn renders_signals_and_memos() {
        let html = render_to_string(|| {
            let name = Signal::new(String::from("nadi"));
            let name2 = name.clone();
            let upper = Memo::new(move || name2.get().to_uppercase());
            format!("<h1>{}</h1>", upper.get())
        });
        assert_eq!(html, "<h1>NADI</h1>");
        assert!(!is_server());
    }

    #[test]
    fn effects_are_inert_on_the_server() {
        let touched = Rc::new(Cell::new(false));
        let touched2 = touched.clone();

        render_to_string(move || {
            assert!(is_server());
            let effect = Effect::new(move || touched2.set(true));
            assert!(effect.is_disposed());
            String::new()
        });

        assert!(!touched.get());
    }

    #[test]
    fn root_is_disposed_after_render() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let log2 = log.clone();

        let html = render_to_string(move || {
            on_cleanup(move || log2.borrow_mut().push("disposed"));
            String::from("<p/>")
        });

        assert_eq!(html, "<p/>");
        assert_eq!(*log.borrow(), vec!["disposed"]);
    }

    #[test]
    fn root_is_disposed_when_render_panics() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let log2 = log.clone();

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            render_to_string(move || {
                on_cleanup(move || log2.borrow_mut().push("disposed"));
                panic!("template error");
            })
        }));

        assert!(outcome.is_err());
        assert_eq!(*log.borrow(), vec!["disposed"]);
        assert!(!is_server());
    }
}
