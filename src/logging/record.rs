//! Log levels, call-site identity and the rendered line format.
//!
//! Line format: `<LEVEL> at <seconds, 2dp>s: <Class>::<method>() -> <message>`

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    /// Written to the transports on the calling thread, never buffered.
    Robot,
    Info,
    Warning,
    Debug,
    Library,
}

impl Level {
    pub fn label(&self) -> &'static str {
        match self {
            Level::Robot | Level::Info | Level::Library => "INFO",
            Level::Warning => "WARNING",
            Level::Debug => "DEBUG",
        }
    }

    #[inline]
    pub fn is_urgent(&self) -> bool {
        matches!(self, Level::Robot)
    }
}

/// The `Class::method` pair a log line is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallSite {
    pub class: &'static str,
    pub method: &'static str,
}

impl CallSite {
    pub const fn new(class: &'static str, method: &'static str) -> Self {
        Self { class, method }
    }

    /// Splits a function path such as `crate::faults::reporter::MonitorCore::tick`
    /// into `("MonitorCore", "tick")`. Closure frames are skipped, generic
    /// arguments dropped, and `<T as Trait>` resolves to `T`.
    pub fn from_function_path(path: &'static str) -> Self {
        let mut segments: Vec<&'static str> = split_top_level(path)
            .into_iter()
            .filter(|s| *s != "{{closure}}")
            .collect();

        let method = segments.pop().unwrap_or("<unknown>");
        let class = segments.pop().map(type_segment_name).unwrap_or("<root>");
        Self { class, method }
    }
}

/// Splits on `::` outside of angle brackets.
fn split_top_level(path: &'static str) -> Vec<&'static str> {
    let bytes = path.as_bytes();
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut i = 0usize;

    while i < bytes.len() {
        match bytes[i] {
            b'<' => depth += 1,
            b'>' => depth = depth.saturating_sub(1),
            b':' if depth == 0 && bytes.get(i + 1) == Some(&b':') => {
                out.push(&path[start..i]);
                i += 2;
                start = i;
                continue;
            }
            _ => {}
        }
        i += 1;
    }
    out.push(&path[start..]);
    out
}

/// `<a::Foo as b::Trait>` -> `Foo`, `Bar<T>` -> `Bar`.
fn type_segment_name(segment: &'static str) -> &'static str {
    let inner = match segment.strip_prefix('<') {
        Some(rest) => rest.split(" as ").next().unwrap_or(rest),
        None => segment,
    };
    let inner = inner.split('<').next().unwrap_or(inner);
    inner.rsplit("::").next().unwrap_or(inner)
}

/// Resolves the enclosing function into a [`CallSite`].
#[macro_export]
macro_rules! call_site {
    () => {{
        fn __here() {}
        fn __type_name_of<T>(_: T) -> &'static str {
            ::std::any::type_name::<T>()
        }
        let path = __type_name_of(__here);
        $crate::logging::record::CallSite::from_function_path(
            path.strip_suffix("::__here").unwrap_or(path),
        )
    }};
}

/// `robot_log!(dispatcher, Level::Warning, "rail {} tripped", name)`; attributes
/// the line to the function containing the macro call.
#[macro_export]
macro_rules! robot_log {
    ($dispatcher:expr, $level:expr, $($arg:tt)+) => {
        $dispatcher.log_at($crate::call_site!(), $level, ::std::format!($($arg)+))
    };
}

/// One log call, rendered at creation time.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub level: Level,
    pub origin: CallSite,
    pub since_boot: Duration,
    pub line: String,
}

impl LogRecord {
    pub fn new(level: Level, origin: CallSite, since_boot: Duration, message: &str) -> Self {
        let line = render(level, origin, since_boot, message);
        Self {
            level,
            origin,
            since_boot,
            line,
        }
    }
}

pub fn render(level: Level, origin: CallSite, since_boot: Duration, message: &str) -> String {
    format!(
        "{} at {:.2}s: {}::{}() -> {}",
        level.label(),
        since_boot.as_secs_f64(),
        origin.class,
        origin.method,
        message
    )
}
