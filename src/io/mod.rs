/// `printk!`/`printkln!` — formatted output to the opaque text console.
///
/// Built on `core::fmt::Write` over `hw::monitor_write` rather than a
/// hand-rolled format parser: the console itself is out of scope, so
/// all this module owns is the `fmt::Write` adapter and the lock
/// around it.

use core::fmt::{self, Write};
use spin::Mutex;

struct Monitor;

impl fmt::Write for Monitor {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        unsafe { crate::hw::monitor_write(s.as_ptr(), s.len()) };
        Ok(())
    }
}

static MONITOR: Mutex<Monitor> = Mutex::new(Monitor);

#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    let _ = MONITOR.lock().write_fmt(args);
}

/// Prints formatted text to the console, no trailing newline.
#[macro_export]
macro_rules! printk {
    ($($arg:tt)*) => {
        $crate::io::_print(core::format_args!($($arg)*))
    };
}

/// Prints formatted text to the console, followed by a newline.
#[macro_export]
macro_rules! printkln {
    () => {
        $crate::printk!("\n")
    };
    ($($arg:tt)*) => {{
        $crate::io::_print(core::format_args!($($arg)*));
        $crate::printk!("\n");
    }};
}
